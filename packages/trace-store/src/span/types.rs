//! In-memory span types handed over by the tracing producer.
//!
//! These are plain aggregates: built once, encoded once, never mutated by
//! the codec. `CallEvent::builder()` mirrors the producer's
//! accumulate-then-build construction.

use serde::{Deserialize, Serialize};

use crate::buffer::{ByteCursor, PrefixWidth};
use crate::error::{Result, TraceError};
use crate::span::annotation::Annotation;

/// Depth value for an event whose call-tree depth was not recorded.
pub const DEPTH_UNSET: i32 = -1;

/// Parent span id of a root span.
pub const ROOT_PARENT_SPAN_ID: i64 = -1;

/// Error attached to a call event: a reference into the string metadata
/// table plus an optional message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub id: i32,
    pub message: Option<String>,
}

impl ExceptionInfo {
    pub fn new(id: i32, message: impl Into<Option<String>>) -> Self {
        Self {
            id,
            message: message.into(),
        }
    }
}

/// One instrumented call within a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEvent {
    pub sequence: u16,
    pub start_elapsed: i32,
    pub end_elapsed: i32,
    pub service_type: i32,
    #[serde(default)]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub end_point: Option<String>,
    pub api_id: i32,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default = "default_depth")]
    pub depth: i32,
    #[serde(default)]
    pub next_span_id: Option<i64>,
    #[serde(default)]
    pub next_async_id: Option<i32>,
    #[serde(default)]
    pub exception_info: Option<ExceptionInfo>,
}

fn default_depth() -> i32 {
    DEPTH_UNSET
}

impl Default for CallEvent {
    fn default() -> Self {
        Self {
            sequence: 0,
            start_elapsed: 0,
            end_elapsed: 0,
            service_type: 0,
            destination_id: None,
            end_point: None,
            api_id: 0,
            annotations: Vec::new(),
            depth: DEPTH_UNSET,
            next_span_id: None,
            next_async_id: None,
            exception_info: None,
        }
    }
}

impl CallEvent {
    pub fn builder() -> CallEventBuilder {
        CallEventBuilder::default()
    }
}

/// Accumulates call-event fields and produces an immutable `CallEvent`.
#[derive(Debug, Default)]
pub struct CallEventBuilder {
    event: CallEvent,
}

impl CallEventBuilder {
    pub fn sequence(mut self, sequence: u16) -> Self {
        self.event.sequence = sequence;
        self
    }

    pub fn start_elapsed(mut self, start_elapsed: i32) -> Self {
        self.event.start_elapsed = start_elapsed;
        self
    }

    pub fn end_elapsed(mut self, end_elapsed: i32) -> Self {
        self.event.end_elapsed = end_elapsed;
        self
    }

    pub fn service_type(mut self, service_type: i32) -> Self {
        self.event.service_type = service_type;
        self
    }

    pub fn destination_id(mut self, destination_id: impl Into<String>) -> Self {
        self.event.destination_id = Some(destination_id.into());
        self
    }

    pub fn end_point(mut self, end_point: impl Into<String>) -> Self {
        self.event.end_point = Some(end_point.into());
        self
    }

    pub fn api_id(mut self, api_id: i32) -> Self {
        self.event.api_id = api_id;
        self
    }

    pub fn annotation(mut self, annotation: Annotation) -> Self {
        self.event.annotations.push(annotation);
        self
    }

    pub fn depth(mut self, depth: i32) -> Self {
        self.event.depth = depth;
        self
    }

    pub fn next_span_id(mut self, next_span_id: i64) -> Self {
        self.event.next_span_id = Some(next_span_id);
        self
    }

    pub fn next_async_id(mut self, next_async_id: i32) -> Self {
        self.event.next_async_id = Some(next_async_id);
        self
    }

    pub fn exception(mut self, id: i32, message: impl Into<String>) -> Self {
        let message: String = message.into();
        self.event.exception_info = Some(ExceptionInfo::new(id, Some(message)));
        self
    }

    pub fn build(self) -> CallEvent {
        self.event
    }
}

/// Trace identifier shared by every span of one distributed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId {
    pub agent_id: String,
    pub agent_start_time: i64,
    pub sequence: i64,
}

impl TransactionId {
    pub fn new(agent_id: impl Into<String>, agent_start_time: i64, sequence: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_start_time,
            sequence,
        }
    }

    /// Compact binary form, used as the row-key discriminator.
    ///
    /// ```text
    /// [agent_id: 1-byte prefixed UTF-8]
    /// [agent_start_time: signed varint]
    /// [sequence: signed varint]
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::with_capacity_hint(self.agent_id.len() + 16);
        self.write_to(&mut cursor)?;
        Ok(cursor.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::wrap(bytes);
        let id = Self::read_from(&mut cursor)?;
        if cursor.has_remaining() {
            return Err(TraceError::CorruptRecord(format!(
                "{} trailing bytes after transaction id",
                cursor.remaining()
            )));
        }
        Ok(id)
    }

    pub(crate) fn write_to(&self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        cursor.put_prefixed_str(Some(self.agent_id.as_str()), PrefixWidth::One)?;
        cursor.put_svar_long(self.agent_start_time)?;
        cursor.put_svar_long(self.sequence)
    }

    pub(crate) fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let agent_id = cursor
            .get_prefixed_string(PrefixWidth::One)
            .map_err(TraceError::into_corrupt)?
            .ok_or_else(|| TraceError::CorruptRecord("transaction id without agent id".into()))?;
        let agent_start_time = cursor.get_svar_long().map_err(TraceError::into_corrupt)?;
        let sequence = cursor.get_svar_long().map_err(TraceError::into_corrupt)?;
        Ok(Self {
            agent_id,
            agent_start_time,
            sequence,
        })
    }
}

/// One span: root-level fields plus its call events in sequence order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRecord {
    pub transaction_id: TransactionId,
    pub agent_id: String,
    pub application_name: String,
    pub span_id: i64,
    #[serde(default = "default_parent_span_id")]
    pub parent_span_id: i64,
    pub start_time: i64,
    pub elapsed: i32,
    pub collector_accept_time: i64,
    #[serde(default)]
    pub events: Vec<CallEvent>,
}

fn default_parent_span_id() -> i64 {
    ROOT_PARENT_SPAN_ID
}

impl SpanRecord {
    pub fn is_root(&self) -> bool {
        self.parent_span_id == ROOT_PARENT_SPAN_ID
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

/// Events of one span flushed after the span itself was stored.
///
/// Carries the span identity so it can be keyed and checked on its own;
/// `key_time` tells chunks of the same span apart and orders them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanChunk {
    pub transaction_id: TransactionId,
    pub agent_id: String,
    pub application_name: String,
    pub span_id: i64,
    /// Start time of the owning span; part of the row key.
    pub start_time: i64,
    pub key_time: i64,
    pub collector_accept_time: i64,
    #[serde(default)]
    pub events: Vec<CallEvent>,
}

impl SpanChunk {
    pub fn for_span(
        span: &SpanRecord,
        key_time: i64,
        collector_accept_time: i64,
        events: Vec<CallEvent>,
    ) -> Self {
        Self {
            transaction_id: span.transaction_id.clone(),
            agent_id: span.agent_id.clone(),
            application_name: span.application_name.clone(),
            span_id: span.span_id,
            start_time: span.start_time,
            key_time,
            collector_accept_time,
            events,
        }
    }

    pub fn belongs_to(&self, span: &SpanRecord) -> bool {
        self.span_id == span.span_id
            && self.start_time == span.start_time
            && self.transaction_id == span.transaction_id
    }
}

impl SpanRecord {
    /// Appends a chunk's events after the span's own.
    pub fn append_chunk(&mut self, chunk: SpanChunk) -> Result<()> {
        if !chunk.belongs_to(self) {
            return Err(TraceError::CorruptRecord(format!(
                "chunk of span {} cannot extend span {}",
                chunk.span_id, self.span_id
            )));
        }
        self.events.extend(chunk.events);
        Ok(())
    }
}
