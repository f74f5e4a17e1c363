//! Column qualifiers for span and span-chunk cells.
//!
//! ```text
//! span:  [span_id: i64 BE]
//! chunk: [span_id: i64 BE][key_time: i64 BE]
//! ```
//!
//! Both live in the same column family; the length tells them apart.

use crate::buffer::ByteCursor;
use crate::error::{Result, TraceError};

const SPAN_QUALIFIER_LEN: usize = 8;
const CHUNK_QUALIFIER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnQualifier {
    Span { span_id: i64 },
    Chunk { span_id: i64, key_time: i64 },
}

impl ColumnQualifier {
    pub fn span_id(&self) -> i64 {
        match *self {
            ColumnQualifier::Span { span_id } | ColumnQualifier::Chunk { span_id, .. } => span_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = ByteCursor::fixed(CHUNK_QUALIFIER_LEN);
        match *self {
            ColumnQualifier::Span { span_id } => cursor.put_i64(span_id)?,
            ColumnQualifier::Chunk { span_id, key_time } => {
                cursor.put_i64(span_id)?;
                cursor.put_i64(key_time)?;
            }
        }
        Ok(cursor.into_vec())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = ByteCursor::wrap(bytes);
        match bytes.len() {
            SPAN_QUALIFIER_LEN => Ok(ColumnQualifier::Span {
                span_id: cursor.get_i64()?,
            }),
            CHUNK_QUALIFIER_LEN => Ok(ColumnQualifier::Chunk {
                span_id: cursor.get_i64()?,
                key_time: cursor.get_i64()?,
            }),
            other => Err(TraceError::CorruptRecord(format!(
                "column qualifier of {} bytes",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_qualifier_is_span_id() {
        let qualifier = ColumnQualifier::Span { span_id: 99 };
        let bytes = qualifier.to_bytes().unwrap();
        assert_eq!(bytes, 99i64.to_be_bytes().to_vec());
        assert_eq!(ColumnQualifier::from_bytes(&bytes).unwrap(), qualifier);
    }

    #[test]
    fn test_chunk_qualifier_roundtrip() {
        let qualifier = ColumnQualifier::Chunk {
            span_id: -7,
            key_time: 1_700_000_000_123,
        };
        let bytes = qualifier.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..8], &(-7i64).to_be_bytes());
        assert_eq!(ColumnQualifier::from_bytes(&bytes).unwrap(), qualifier);
        assert_eq!(qualifier.span_id(), -7);
    }

    #[test]
    fn test_odd_length_is_corrupt() {
        assert!(matches!(
            ColumnQualifier::from_bytes(&[0; 12]),
            Err(TraceError::CorruptRecord(_))
        ));
    }
}
