//! Span model and its column encoding.

pub mod annotation;
pub mod bitfield;
pub mod codec;
pub mod types;

pub use annotation::{Annotation, AnnotationValue};
pub use bitfield::{CallEventBitField, EncodingStrategy, StrategySlot};
pub use codec::{DecodedSpan, SpanCodec, CHUNK_FORMAT_VERSION, SPAN_FORMAT_VERSION};
pub use types::{
    CallEvent, CallEventBuilder, ExceptionInfo, SpanChunk, SpanRecord, TransactionId, DEPTH_UNSET,
    ROOT_PARENT_SPAN_ID,
};
