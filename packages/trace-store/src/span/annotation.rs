//! Key-tagged annotation values attached to call events.
//!
//! Binary format of one annotation:
//! ```text
//! [key: signed varint]
//! [tag: u8]
//! [payload: depends on tag]
//! ```
//!
//! | tag | value        | payload                                   |
//! |-----|--------------|-------------------------------------------|
//! | 0   | Null         | none                                      |
//! | 1   | String       | 4-byte prefixed UTF-8                     |
//! | 2   | Bool         | u8 (0 or 1)                               |
//! | 3   | Int          | signed varint                             |
//! | 4   | Long         | signed varint (64-bit)                    |
//! | 5   | Double       | f64 bits, 8 bytes BE                      |
//! | 6   | Bytes        | 4-byte prefixed raw bytes                 |
//! | 7   | IntString    | signed varint + 4-byte prefixed UTF-8/null |
//! | 8   | StringString | two 4-byte prefixed UTF-8/null            |

use serde::{Deserialize, Serialize};

use crate::buffer::{ByteCursor, PrefixWidth};
use crate::error::{Result, TraceError};

const TAG_NULL: u8 = 0;
const TAG_STRING: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_DOUBLE: u8 = 5;
const TAG_BYTES: u8 = 6;
const TAG_INT_STRING: u8 = 7;
const TAG_STRING_STRING: u8 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AnnotationValue {
    Null,
    String(String),
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Bytes(Vec<u8>),
    IntString {
        int_value: i32,
        string_value: Option<String>,
    },
    StringString {
        first: Option<String>,
        second: Option<String>,
    },
}

impl AnnotationValue {
    pub fn tag(&self) -> u8 {
        match self {
            AnnotationValue::Null => TAG_NULL,
            AnnotationValue::String(_) => TAG_STRING,
            AnnotationValue::Bool(_) => TAG_BOOL,
            AnnotationValue::Int(_) => TAG_INT,
            AnnotationValue::Long(_) => TAG_LONG,
            AnnotationValue::Double(_) => TAG_DOUBLE,
            AnnotationValue::Bytes(_) => TAG_BYTES,
            AnnotationValue::IntString { .. } => TAG_INT_STRING,
            AnnotationValue::StringString { .. } => TAG_STRING_STRING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub key: i32,
    pub value: AnnotationValue,
}

impl Annotation {
    pub fn new(key: i32, value: AnnotationValue) -> Self {
        Self { key, value }
    }

    pub fn string(key: i32, value: impl Into<String>) -> Self {
        Self::new(key, AnnotationValue::String(value.into()))
    }

    pub fn int(key: i32, value: i32) -> Self {
        Self::new(key, AnnotationValue::Int(value))
    }

    pub(crate) fn write_to(&self, cursor: &mut ByteCursor<'_>) -> Result<()> {
        cursor.put_svar_int(self.key)?;
        cursor.put_u8(self.value.tag())?;
        match &self.value {
            AnnotationValue::Null => Ok(()),
            AnnotationValue::String(s) => cursor.put_prefixed_str(Some(s.as_str()), PrefixWidth::Four),
            AnnotationValue::Bool(b) => cursor.put_bool(*b),
            AnnotationValue::Int(v) => cursor.put_svar_int(*v),
            AnnotationValue::Long(v) => cursor.put_svar_long(*v),
            AnnotationValue::Double(v) => cursor.put_fixed(8, v.to_bits()),
            AnnotationValue::Bytes(bytes) => {
                cursor.put_prefixed_bytes(Some(bytes.as_slice()), PrefixWidth::Four)
            }
            AnnotationValue::IntString {
                int_value,
                string_value,
            } => {
                cursor.put_svar_int(*int_value)?;
                cursor.put_prefixed_str(string_value.as_deref(), PrefixWidth::Four)
            }
            AnnotationValue::StringString { first, second } => {
                cursor.put_prefixed_str(first.as_deref(), PrefixWidth::Four)?;
                cursor.put_prefixed_str(second.as_deref(), PrefixWidth::Four)
            }
        }
    }

    /// Reads one annotation. Every failure is reported as `CorruptRecord`.
    pub(crate) fn read_from(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Self::read_inner(cursor).map_err(TraceError::into_corrupt)
    }

    fn read_inner(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        let key = cursor.get_svar_int()?;
        let tag = cursor.get_u8()?;
        let value = match tag {
            TAG_NULL => AnnotationValue::Null,
            TAG_STRING => AnnotationValue::String(required_string(cursor)?),
            TAG_BOOL => AnnotationValue::Bool(cursor.get_bool()?),
            TAG_INT => AnnotationValue::Int(cursor.get_svar_int()?),
            TAG_LONG => AnnotationValue::Long(cursor.get_svar_long()?),
            TAG_DOUBLE => AnnotationValue::Double(f64::from_bits(cursor.get_fixed(8)?)),
            TAG_BYTES => AnnotationValue::Bytes(
                cursor
                    .get_prefixed_bytes(PrefixWidth::Four)?
                    .ok_or_else(|| {
                        TraceError::CorruptRecord("null payload for bytes annotation".into())
                    })?
                    .to_vec(),
            ),
            TAG_INT_STRING => AnnotationValue::IntString {
                int_value: cursor.get_svar_int()?,
                string_value: cursor.get_prefixed_string(PrefixWidth::Four)?,
            },
            TAG_STRING_STRING => AnnotationValue::StringString {
                first: cursor.get_prefixed_string(PrefixWidth::Four)?,
                second: cursor.get_prefixed_string(PrefixWidth::Four)?,
            },
            other => {
                return Err(TraceError::CorruptRecord(format!(
                    "unknown annotation tag {}",
                    other
                )))
            }
        };
        Ok(Self { key, value })
    }
}

fn required_string(cursor: &mut ByteCursor<'_>) -> Result<String> {
    cursor
        .get_prefixed_string(PrefixWidth::Four)?
        .ok_or_else(|| TraceError::CorruptRecord("null payload for string annotation".into()))
}
