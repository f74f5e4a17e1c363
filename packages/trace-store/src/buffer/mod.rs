//! Byte-level primitives shared by the span and row-key codecs.

pub mod cursor;
pub mod varint;

pub use cursor::{ByteCursor, PrefixWidth, NULL_LENGTH};
