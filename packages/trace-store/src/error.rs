//! Error types for the trace codec and key distribution layer

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Buffer overflow: {requested} bytes requested, {remaining} remaining")]
    BufferOverflow { requested: usize, remaining: usize },

    #[error("Encoding too large: {len} bytes exceeds limit of {max}")]
    EncodingTooLarge { len: usize, max: usize },

    #[error("Unsupported fixed width: {0} (expected 1, 2, 4 or 8)")]
    UnsupportedWidth(usize),

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Identifier too long: {field} is {len} bytes (max {max})")]
    IdentifierTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(i64),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceError {
    /// Stable error code for logs and callers that branch on kind.
    pub fn code(&self) -> &'static str {
        match self {
            TraceError::BufferOverflow { .. } => "BUFFER_OVERFLOW",
            TraceError::EncodingTooLarge { .. } => "ENCODING_TOO_LARGE",
            TraceError::UnsupportedWidth(_) => "UNSUPPORTED_WIDTH",
            TraceError::MalformedEncoding(_) => "MALFORMED_ENCODING",
            TraceError::CorruptRecord(_) => "CORRUPT_RECORD",
            TraceError::IdentifierTooLong { .. } => "IDENTIFIER_TOO_LONG",
            TraceError::InvalidIdentifier(_) => "INVALID_IDENTIFIER",
            TraceError::TimestampOutOfRange(_) => "TIMESTAMP_OUT_OF_RANGE",
            TraceError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            _ => "INTERNAL_ERROR",
        }
    }

    /// Re-labels a cursor-level decode failure as record corruption.
    ///
    /// Record decoders read through a `ByteCursor`; a truncated or malformed
    /// primitive inside a record means the record itself is corrupt.
    pub(crate) fn into_corrupt(self) -> Self {
        match self {
            TraceError::MalformedEncoding(msg) => TraceError::CorruptRecord(msg),
            other => other,
        }
    }
}
