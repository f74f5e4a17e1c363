//! trace-store: span record codec and salted row-key distribution
//!
//! Encodes a span's call events into a compact, delta-aware column value,
//! builds reverse-chronological row keys, and spreads writes across salt
//! buckets while keeping per-entity scans bounded.

pub mod buffer;
pub mod config;
pub mod error;
pub mod key;
pub mod scan;
pub mod span;
pub mod trace;

pub use buffer::{ByteCursor, PrefixWidth};
pub use config::{DistributorConfig, ScanConfig, TraceStoreConfig};
pub use error::{Result, TraceError};
pub use key::{KeyDistributor, RowKey, RowKeyCodec, RowKeyLayout};
pub use scan::{LimitCollector, ScanRange, ScanRow};
pub use span::{
    Annotation, AnnotationValue, CallEvent, CallEventBitField, EncodingStrategy, ExceptionInfo,
    SpanChunk, SpanCodec, SpanRecord, TransactionId,
};
pub use trace::{ColumnQualifier, SpanRowMapper, SpanWriter, TracePut, TraceReader};
