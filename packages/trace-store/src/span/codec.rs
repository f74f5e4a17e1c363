//! Span column codec.
//!
//! Binary format (all varints LEB128, "svar" = zig-zag varint):
//! ```text
//! [version: u8 = 1]
//! [agent_id: 1-byte prefixed UTF-8]
//! [application_name: 1-byte prefixed UTF-8]
//! [transaction id: agent 1-byte prefixed, start svarlong, sequence svarlong]
//! [span_id: i64 BE]
//! [parent_span_id: svarlong]
//! [start_time: svarlong]
//! [elapsed: svarint]
//! [collector_accept_time - start_time: svarlong]
//! [event_count: varint]
//! [call events...]
//! ```
//!
//! Each call event:
//! ```text
//! [flags: varint (CallEventBitField)]
//! [sequence: per strategy]
//! [start_elapsed: per strategy]
//! [end_elapsed: svarint]
//! [service_type: per strategy]
//! [depth: per strategy]
//! [destination_id: 2-byte prefixed]      if flagged
//! [end_point: 2-byte prefixed]           if flagged
//! [api_id: svarint]
//! [annotations: varint count + entries]  if flagged
//! [next_span_id: svarlong]               if flagged
//! [next_async_id: svarint]               if flagged
//! [exception: svarint id + 2-byte prefixed message] if flagged
//! ```
//!
//! A span chunk carries events flushed after the span column was written:
//! ```text
//! [version: u8 = 1]
//! [agent_id, application_name, transaction id: as in the span column]
//! [span_id: i64 BE]
//! [start_time: svarlong]
//! [key_time - start_time: svarlong]
//! [collector_accept_time - key_time: svarlong]
//! [continues: bool]  first event is relative to a caller-supplied base
//! [event_count: varint]
//! [call events...]
//! ```
//!
//! Strategy payloads: `Raw` writes the value as svarint, `DeltaFromPrevious`
//! writes `current - previous` as svarint, `EqualsPrevious` and
//! `IncrementFromPrevious` write nothing.

use crate::buffer::{ByteCursor, PrefixWidth};
use crate::error::{Result, TraceError};
use crate::span::annotation::Annotation;
use crate::span::bitfield::{CallEventBitField, EncodingStrategy};
use crate::span::types::{CallEvent, ExceptionInfo, SpanChunk, SpanRecord, TransactionId};

pub const SPAN_FORMAT_VERSION: u8 = 1;
pub const CHUNK_FORMAT_VERSION: u8 = 1;

/// A decoded span together with the flag word of every event, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSpan {
    pub record: SpanRecord,
    pub bit_fields: Vec<CallEventBitField>,
}

/// Stateless encoder/decoder for the span column value.
pub struct SpanCodec;

impl SpanCodec {
    pub fn encode(span: &SpanRecord) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_capacity_hint(64 + span.events.len() * 16);
        Self::encode_into(span, &mut cursor)?;
        Ok(cursor.into_vec())
    }

    /// Encodes into a caller-supplied cursor, e.g. a fixed-capacity one.
    pub fn encode_into(span: &SpanRecord, cursor: &mut ByteCursor<'_>) -> Result<()> {
        cursor.put_u8(SPAN_FORMAT_VERSION)?;
        cursor.put_prefixed_str(Some(span.agent_id.as_str()), PrefixWidth::One)?;
        cursor.put_prefixed_str(Some(span.application_name.as_str()), PrefixWidth::One)?;
        span.transaction_id.write_to(cursor)?;
        cursor.put_i64(span.span_id)?;
        cursor.put_svar_long(span.parent_span_id)?;
        cursor.put_svar_long(span.start_time)?;
        cursor.put_svar_int(span.elapsed)?;
        cursor.put_svar_long(span.collector_accept_time.wrapping_sub(span.start_time))?;

        write_events(cursor, &span.events, None)
    }

    /// Encodes a chunk of late events.
    ///
    /// `base` is the last event already stored for the span (the tail of the
    /// span column or of the previous chunk). When given, the first chunk
    /// event is encoded relative to it and the same base must be supplied to
    /// `decode_chunk`.
    pub fn encode_chunk(chunk: &SpanChunk, base: Option<&CallEvent>) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_capacity_hint(64 + chunk.events.len() * 16);
        cursor.put_u8(CHUNK_FORMAT_VERSION)?;
        cursor.put_prefixed_str(Some(chunk.agent_id.as_str()), PrefixWidth::One)?;
        cursor.put_prefixed_str(Some(chunk.application_name.as_str()), PrefixWidth::One)?;
        chunk.transaction_id.write_to(&mut cursor)?;
        cursor.put_i64(chunk.span_id)?;
        cursor.put_svar_long(chunk.start_time)?;
        cursor.put_svar_long(chunk.key_time.wrapping_sub(chunk.start_time))?;
        cursor.put_svar_long(chunk.collector_accept_time.wrapping_sub(chunk.key_time))?;
        cursor.put_bool(base.is_some())?;
        write_events(&mut cursor, &chunk.events, base)?;
        Ok(cursor.into_vec())
    }

    pub fn decode_chunk(bytes: &[u8], base: Option<&CallEvent>) -> Result<SpanChunk> {
        let mut cursor = ByteCursor::wrap(bytes);
        let chunk = read_chunk(&mut cursor, base).map_err(TraceError::into_corrupt)?;
        if cursor.has_remaining() {
            return Err(TraceError::CorruptRecord(format!(
                "{} trailing bytes after span chunk",
                cursor.remaining()
            )));
        }
        Ok(chunk)
    }

    pub fn decode(bytes: &[u8]) -> Result<SpanRecord> {
        Ok(Self::decode_detailed(bytes)?.record)
    }

    pub fn decode_detailed(bytes: &[u8]) -> Result<DecodedSpan> {
        let mut cursor = ByteCursor::wrap(bytes);
        let decoded = read_span(&mut cursor).map_err(TraceError::into_corrupt)?;
        if cursor.has_remaining() {
            return Err(TraceError::CorruptRecord(format!(
                "{} trailing bytes after span",
                cursor.remaining()
            )));
        }
        Ok(decoded)
    }
}

// ── Encoding ──────────────────────────────────────────────────────────

fn write_events(
    cursor: &mut ByteCursor<'_>,
    events: &[CallEvent],
    base: Option<&CallEvent>,
) -> Result<()> {
    let count = u32::try_from(events.len()).map_err(|_| TraceError::EncodingTooLarge {
        len: events.len(),
        max: u32::MAX as usize,
    })?;
    cursor.put_var_int(count)?;

    let mut previous = base;
    for event in events {
        let bits = match previous {
            None => CallEventBitField::build_first(event),
            Some(prev) => CallEventBitField::build(event, prev),
        };
        write_event(cursor, event, previous, bits)?;
        previous = Some(event);
    }
    Ok(())
}

fn write_event(
    cursor: &mut ByteCursor<'_>,
    event: &CallEvent,
    previous: Option<&CallEvent>,
    bits: CallEventBitField,
) -> Result<()> {
    cursor.put_var_int(bits.raw() as u32)?;

    write_slot(
        cursor,
        bits.sequence_strategy(),
        event.sequence as i32,
        previous.map(|p| p.sequence as i32),
    )?;
    write_slot(
        cursor,
        bits.start_elapsed_strategy(),
        event.start_elapsed,
        previous.map(|p| p.start_elapsed),
    )?;
    cursor.put_svar_int(event.end_elapsed)?;
    write_slot(
        cursor,
        bits.service_type_strategy(),
        event.service_type,
        previous.map(|p| p.service_type),
    )?;
    write_slot(
        cursor,
        bits.depth_strategy(),
        event.depth,
        previous.map(|p| p.depth),
    )?;

    if bits.has_destination_id() {
        cursor.put_prefixed_str(event.destination_id.as_deref(), PrefixWidth::Two)?;
    }
    if bits.has_end_point() {
        cursor.put_prefixed_str(event.end_point.as_deref(), PrefixWidth::Two)?;
    }
    cursor.put_svar_int(event.api_id)?;

    if bits.has_annotations() {
        let count = u32::try_from(event.annotations.len()).map_err(|_| {
            TraceError::EncodingTooLarge {
                len: event.annotations.len(),
                max: u32::MAX as usize,
            }
        })?;
        cursor.put_var_int(count)?;
        for annotation in &event.annotations {
            annotation.write_to(cursor)?;
        }
    }
    if let Some(next_span_id) = event.next_span_id {
        cursor.put_svar_long(next_span_id)?;
    }
    if let Some(next_async_id) = event.next_async_id {
        cursor.put_svar_int(next_async_id)?;
    }
    if let Some(exception) = &event.exception_info {
        cursor.put_svar_int(exception.id)?;
        cursor.put_prefixed_str(exception.message.as_deref(), PrefixWidth::Two)?;
    }
    Ok(())
}

fn write_slot(
    cursor: &mut ByteCursor<'_>,
    strategy: EncodingStrategy,
    current: i32,
    previous: Option<i32>,
) -> Result<()> {
    match (strategy, previous) {
        (EncodingStrategy::Raw, _) => cursor.put_svar_int(current),
        (EncodingStrategy::DeltaFromPrevious, Some(prev)) => {
            cursor.put_svar_int(current.wrapping_sub(prev))
        }
        (EncodingStrategy::EqualsPrevious, Some(_))
        | (EncodingStrategy::IncrementFromPrevious, Some(_)) => Ok(()),
        (strategy, None) => Err(TraceError::CorruptRecord(format!(
            "{} chosen without a previous event",
            strategy
        ))),
    }
}

// ── Decoding ──────────────────────────────────────────────────────────

fn read_span(cursor: &mut ByteCursor<'_>) -> Result<DecodedSpan> {
    let version = cursor.get_u8()?;
    if version != SPAN_FORMAT_VERSION {
        return Err(TraceError::CorruptRecord(format!(
            "unsupported span format version {}",
            version
        )));
    }
    let agent_id = required_string(cursor, "agent_id")?;
    let application_name = required_string(cursor, "application_name")?;
    let transaction_id = TransactionId::read_from(cursor)?;
    let span_id = cursor.get_i64()?;
    let parent_span_id = cursor.get_svar_long()?;
    let start_time = cursor.get_svar_long()?;
    let elapsed = cursor.get_svar_int()?;
    let collector_accept_time = start_time.wrapping_add(cursor.get_svar_long()?);

    let (events, bit_fields) = read_events(cursor, None)?;

    Ok(DecodedSpan {
        record: SpanRecord {
            transaction_id,
            agent_id,
            application_name,
            span_id,
            parent_span_id,
            start_time,
            elapsed,
            collector_accept_time,
            events,
        },
        bit_fields,
    })
}

fn read_chunk(cursor: &mut ByteCursor<'_>, base: Option<&CallEvent>) -> Result<SpanChunk> {
    let version = cursor.get_u8()?;
    if version != CHUNK_FORMAT_VERSION {
        return Err(TraceError::CorruptRecord(format!(
            "unsupported span chunk format version {}",
            version
        )));
    }
    let agent_id = required_string(cursor, "agent_id")?;
    let application_name = required_string(cursor, "application_name")?;
    let transaction_id = TransactionId::read_from(cursor)?;
    let span_id = cursor.get_i64()?;
    let start_time = cursor.get_svar_long()?;
    let key_time = start_time.wrapping_add(cursor.get_svar_long()?);
    let collector_accept_time = key_time.wrapping_add(cursor.get_svar_long()?);

    let continues = cursor.get_bool()?;
    let base = match (continues, base) {
        (true, Some(base)) => Some(base),
        (true, None) => {
            return Err(TraceError::CorruptRecord(
                "span chunk continues earlier events but no base event was given".into(),
            ))
        }
        (false, _) => None,
    };
    let (events, _) = read_events(cursor, base)?;

    Ok(SpanChunk {
        transaction_id,
        agent_id,
        application_name,
        span_id,
        start_time,
        key_time,
        collector_accept_time,
        events,
    })
}

fn read_events(
    cursor: &mut ByteCursor<'_>,
    base: Option<&CallEvent>,
) -> Result<(Vec<CallEvent>, Vec<CallEventBitField>)> {
    let count = cursor.get_var_int()? as usize;
    // Capacity is bounded by the input, not the declared count.
    let mut events: Vec<CallEvent> = Vec::with_capacity(count.min(cursor.remaining()));
    let mut bit_fields = Vec::with_capacity(count.min(cursor.remaining()));
    for _ in 0..count {
        let (event, bits) = read_event(cursor, events.last().or(base))?;
        events.push(event);
        bit_fields.push(bits);
    }
    Ok((events, bit_fields))
}

fn read_event(
    cursor: &mut ByteCursor<'_>,
    previous: Option<&CallEvent>,
) -> Result<(CallEvent, CallEventBitField)> {
    let raw = cursor.get_var_int()?;
    let raw = u16::try_from(raw)
        .map_err(|_| TraceError::CorruptRecord(format!("call event flags {:#x} exceed 16 bits", raw)))?;
    let bits = CallEventBitField::from_raw(raw, previous.is_none())?;

    let sequence = read_slot(
        cursor,
        bits.sequence_strategy(),
        previous.map(|p| p.sequence as i32),
    )?;
    let sequence = u16::try_from(sequence)
        .map_err(|_| TraceError::CorruptRecord(format!("sequence {} out of range", sequence)))?;
    let start_elapsed = read_slot(
        cursor,
        bits.start_elapsed_strategy(),
        previous.map(|p| p.start_elapsed),
    )?;
    let end_elapsed = cursor.get_svar_int()?;
    let service_type = read_slot(
        cursor,
        bits.service_type_strategy(),
        previous.map(|p| p.service_type),
    )?;
    let depth = read_slot(cursor, bits.depth_strategy(), previous.map(|p| p.depth))?;

    let destination_id = if bits.has_destination_id() {
        Some(required_text(cursor, PrefixWidth::Two, "destination_id")?)
    } else {
        None
    };
    let end_point = if bits.has_end_point() {
        Some(required_text(cursor, PrefixWidth::Two, "end_point")?)
    } else {
        None
    };
    let api_id = cursor.get_svar_int()?;

    let annotations = if bits.has_annotations() {
        let count = cursor.get_var_int()? as usize;
        if count == 0 {
            return Err(TraceError::CorruptRecord(
                "annotation flag set with zero annotations".into(),
            ));
        }
        let mut annotations = Vec::with_capacity(count.min(cursor.remaining()));
        for _ in 0..count {
            annotations.push(Annotation::read_from(cursor)?);
        }
        annotations
    } else {
        Vec::new()
    };
    let next_span_id = if bits.has_next_span_id() {
        Some(cursor.get_svar_long()?)
    } else {
        None
    };
    let next_async_id = if bits.has_next_async_id() {
        Some(cursor.get_svar_int()?)
    } else {
        None
    };
    let exception_info = if bits.has_exception() {
        let id = cursor.get_svar_int()?;
        let message = cursor.get_prefixed_string(PrefixWidth::Two)?;
        Some(ExceptionInfo { id, message })
    } else {
        None
    };

    let event = CallEvent {
        sequence,
        start_elapsed,
        end_elapsed,
        service_type,
        destination_id,
        end_point,
        api_id,
        annotations,
        depth,
        next_span_id,
        next_async_id,
        exception_info,
    };
    Ok((event, bits))
}

fn read_slot(
    cursor: &mut ByteCursor<'_>,
    strategy: EncodingStrategy,
    previous: Option<i32>,
) -> Result<i32> {
    match (strategy, previous) {
        (EncodingStrategy::Raw, _) => cursor.get_svar_int(),
        (EncodingStrategy::EqualsPrevious, Some(prev)) => Ok(prev),
        (EncodingStrategy::DeltaFromPrevious, Some(prev)) => {
            Ok(prev.wrapping_add(cursor.get_svar_int()?))
        }
        (EncodingStrategy::IncrementFromPrevious, Some(prev)) => Ok(prev.wrapping_add(1)),
        (strategy, None) => Err(TraceError::CorruptRecord(format!(
            "{} without a previous event",
            strategy
        ))),
    }
}

fn required_string(cursor: &mut ByteCursor<'_>, field: &str) -> Result<String> {
    required_text(cursor, PrefixWidth::One, field)
}

fn required_text(cursor: &mut ByteCursor<'_>, width: PrefixWidth, field: &str) -> Result<String> {
    cursor
        .get_prefixed_string(width)?
        .ok_or_else(|| TraceError::CorruptRecord(format!("null {}", field)))
}
