//! Per-event encoding strategy selection and the 16-bit flag word that
//! records it.
//!
//! Bit layout (LSB first):
//! ```text
//!  0      end point present
//!  1      destination id present
//!  2      next span id present
//!  3      exception present
//!  4      annotations present
//!  5      next async id present
//!  6..7   sequence strategy
//!  8..9   start elapsed strategy
//! 10..11  service type strategy
//! 12..13  depth strategy
//! 14..15  reserved (zero)
//! ```
//!
//! A strategy slot holds one of the `EncodingStrategy` codes. The first event
//! of a span has no predecessor, so every slot must be `Raw`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::varint::svar32_size;
use crate::error::{Result, TraceError};
use crate::span::types::CallEvent;

const END_POINT_BIT: u16 = 1 << 0;
const DESTINATION_ID_BIT: u16 = 1 << 1;
const NEXT_SPAN_ID_BIT: u16 = 1 << 2;
const EXCEPTION_BIT: u16 = 1 << 3;
const ANNOTATIONS_BIT: u16 = 1 << 4;
const NEXT_ASYNC_ID_BIT: u16 = 1 << 5;

const RESERVED_MASK: u16 = 0b11 << 14;
const SLOT_MASK: u16 = 0b11;

/// How one integer field of a call event is written relative to the
/// preceding event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncodingStrategy {
    /// Full value as a signed varint.
    Raw,
    /// Same as the predecessor; no payload.
    EqualsPrevious,
    /// Signed varint of `current - previous`.
    DeltaFromPrevious,
    /// Predecessor plus one; no payload.
    IncrementFromPrevious,
}

impl EncodingStrategy {
    pub fn code(self) -> u16 {
        match self {
            EncodingStrategy::Raw => 0,
            EncodingStrategy::EqualsPrevious => 1,
            EncodingStrategy::DeltaFromPrevious => 2,
            EncodingStrategy::IncrementFromPrevious => 3,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(EncodingStrategy::Raw),
            1 => Some(EncodingStrategy::EqualsPrevious),
            2 => Some(EncodingStrategy::DeltaFromPrevious),
            3 => Some(EncodingStrategy::IncrementFromPrevious),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncodingStrategy::Raw => "RAW",
            EncodingStrategy::EqualsPrevious => "EQUALS_PREVIOUS",
            EncodingStrategy::DeltaFromPrevious => "DELTA_FROM_PREVIOUS",
            EncodingStrategy::IncrementFromPrevious => "INCREMENT_FROM_PREVIOUS",
        }
    }

    /// Whether decoding needs the preceding event's value.
    pub fn needs_previous(self) -> bool {
        self != EncodingStrategy::Raw
    }
}

impl fmt::Display for EncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four delta-eligible fields of a call event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategySlot {
    Sequence,
    StartElapsed,
    ServiceType,
    Depth,
}

impl StrategySlot {
    pub const ALL: [StrategySlot; 4] = [
        StrategySlot::Sequence,
        StrategySlot::StartElapsed,
        StrategySlot::ServiceType,
        StrategySlot::Depth,
    ];

    fn shift(self) -> u16 {
        match self {
            StrategySlot::Sequence => 6,
            StrategySlot::StartElapsed => 8,
            StrategySlot::ServiceType => 10,
            StrategySlot::Depth => 12,
        }
    }

    /// Sequence numbers may increment but never repeat; the other fields may
    /// repeat but never implicitly increment.
    pub fn allows(self, strategy: EncodingStrategy) -> bool {
        match self {
            StrategySlot::Sequence => strategy != EncodingStrategy::EqualsPrevious,
            _ => strategy != EncodingStrategy::IncrementFromPrevious,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategySlot::Sequence => "sequence",
            StrategySlot::StartElapsed => "start_elapsed",
            StrategySlot::ServiceType => "service_type",
            StrategySlot::Depth => "depth",
        }
    }
}

/// Packed presence bits and strategy slots for one call event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallEventBitField(u16);

impl CallEventBitField {
    /// Flags for the first event of a span: presence bits only, all slots raw.
    pub fn build_first(event: &CallEvent) -> Self {
        Self::presence_of(event)
    }

    /// Flags for an event following `previous`, choosing the cheapest
    /// lossless strategy per slot.
    pub fn build(current: &CallEvent, previous: &CallEvent) -> Self {
        let mut bits = Self::presence_of(current);

        let sequence = if previous.sequence.checked_add(1) == Some(current.sequence) {
            EncodingStrategy::IncrementFromPrevious
        } else {
            EncodingStrategy::DeltaFromPrevious
        };
        bits.set_strategy(StrategySlot::Sequence, sequence);
        bits.set_strategy(
            StrategySlot::StartElapsed,
            choose_value_strategy(current.start_elapsed, previous.start_elapsed),
        );
        bits.set_strategy(
            StrategySlot::ServiceType,
            choose_value_strategy(current.service_type, previous.service_type),
        );
        bits.set_strategy(
            StrategySlot::Depth,
            choose_value_strategy(current.depth, previous.depth),
        );
        bits
    }

    /// Validates a flag word read from storage.
    pub fn from_raw(raw: u16, first_event: bool) -> Result<Self> {
        if raw & RESERVED_MASK != 0 {
            return Err(TraceError::CorruptRecord(format!(
                "reserved bits set in call event flags {:#06x}",
                raw
            )));
        }
        let bits = Self(raw);
        for slot in StrategySlot::ALL {
            let strategy = bits.strategy(slot);
            if !slot.allows(strategy) {
                return Err(TraceError::CorruptRecord(format!(
                    "strategy {} is not valid for {}",
                    strategy,
                    slot.name()
                )));
            }
            if first_event && strategy.needs_previous() {
                return Err(TraceError::CorruptRecord(format!(
                    "first event uses {} for {}",
                    strategy,
                    slot.name()
                )));
            }
        }
        Ok(bits)
    }

    pub fn raw(self) -> u16 {
        self.0
    }

    pub fn strategy(self, slot: StrategySlot) -> EncodingStrategy {
        let code = (self.0 >> slot.shift()) & SLOT_MASK;
        // Two bits always map to one of the four codes.
        EncodingStrategy::from_code(code).unwrap_or(EncodingStrategy::Raw)
    }

    pub fn set_strategy(&mut self, slot: StrategySlot, strategy: EncodingStrategy) {
        let shift = slot.shift();
        self.0 = (self.0 & !(SLOT_MASK << shift)) | (strategy.code() << shift);
    }

    pub fn sequence_strategy(self) -> EncodingStrategy {
        self.strategy(StrategySlot::Sequence)
    }

    pub fn start_elapsed_strategy(self) -> EncodingStrategy {
        self.strategy(StrategySlot::StartElapsed)
    }

    pub fn service_type_strategy(self) -> EncodingStrategy {
        self.strategy(StrategySlot::ServiceType)
    }

    pub fn depth_strategy(self) -> EncodingStrategy {
        self.strategy(StrategySlot::Depth)
    }

    pub fn has_end_point(self) -> bool {
        self.0 & END_POINT_BIT != 0
    }

    pub fn has_destination_id(self) -> bool {
        self.0 & DESTINATION_ID_BIT != 0
    }

    pub fn has_next_span_id(self) -> bool {
        self.0 & NEXT_SPAN_ID_BIT != 0
    }

    pub fn has_exception(self) -> bool {
        self.0 & EXCEPTION_BIT != 0
    }

    pub fn has_annotations(self) -> bool {
        self.0 & ANNOTATIONS_BIT != 0
    }

    pub fn has_next_async_id(self) -> bool {
        self.0 & NEXT_ASYNC_ID_BIT != 0
    }

    fn presence_of(event: &CallEvent) -> Self {
        let mut raw = 0u16;
        if event.end_point.is_some() {
            raw |= END_POINT_BIT;
        }
        if event.destination_id.is_some() {
            raw |= DESTINATION_ID_BIT;
        }
        if event.next_span_id.is_some() {
            raw |= NEXT_SPAN_ID_BIT;
        }
        if event.exception_info.is_some() {
            raw |= EXCEPTION_BIT;
        }
        if !event.annotations.is_empty() {
            raw |= ANNOTATIONS_BIT;
        }
        if event.next_async_id.is_some() {
            raw |= NEXT_ASYNC_ID_BIT;
        }
        Self(raw)
    }
}

/// Equal values cost nothing; a delta is used only when its varint is
/// strictly shorter than the raw value's.
fn choose_value_strategy(current: i32, previous: i32) -> EncodingStrategy {
    if current == previous {
        return EncodingStrategy::EqualsPrevious;
    }
    let delta = current.wrapping_sub(previous);
    if svar32_size(delta) < svar32_size(current) {
        EncodingStrategy::DeltaFromPrevious
    } else {
        EncodingStrategy::Raw
    }
}
