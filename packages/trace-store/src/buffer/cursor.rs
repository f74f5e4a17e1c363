//! Position-tracked byte buffer used by every record and key codec.
//!
//! A `ByteCursor` is either:
//! - growable (`ByteCursor::growable`) — writes extend the buffer freely,
//! - fixed (`ByteCursor::fixed`) — writes past the declared capacity fail
//!   with `BufferOverflow`,
//! - wrapped (`ByteCursor::wrap`) — borrows existing bytes for decoding;
//!   its capacity is the wrapped length.
//!
//! Fixed-width integers are big-endian. Writes at an offset inside the
//! already-written region overwrite in place; writes at the end append.
//! Reads never advance the cursor on failure.

use std::borrow::Cow;

use crate::buffer::varint::{
    decode_var32, decode_var64, encode_var64, zigzag_decode_32, zigzag_decode_64,
    zigzag_encode_32, zigzag_encode_64,
};
use crate::error::{Result, TraceError};

/// Length sentinel marking an absent (null) value in a signed prefix.
pub const NULL_LENGTH: i32 = -1;

/// Width of a length prefix in front of a byte payload.
///
/// Prefixes are signed so that `-1` can mark an absent value. The largest
/// payload is therefore the signed maximum of the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixWidth {
    One,
    Two,
    Four,
}

impl PrefixWidth {
    pub fn bytes(self) -> usize {
        match self {
            PrefixWidth::One => 1,
            PrefixWidth::Two => 2,
            PrefixWidth::Four => 4,
        }
    }

    /// Largest payload length the prefix can describe.
    pub fn max_len(self) -> usize {
        match self {
            PrefixWidth::One => i8::MAX as usize,
            PrefixWidth::Two => i16::MAX as usize,
            PrefixWidth::Four => i32::MAX as usize,
        }
    }
}

#[derive(Debug)]
pub struct ByteCursor<'a> {
    buf: Cow<'a, [u8]>,
    offset: usize,
    /// Upper bound on the buffer length; `None` for growable cursors.
    capacity: Option<usize>,
}

impl ByteCursor<'static> {
    /// A cursor whose buffer grows on demand.
    pub fn growable() -> Self {
        Self::with_capacity_hint(64)
    }

    /// A growable cursor with a preallocated capacity hint.
    pub fn with_capacity_hint(hint: usize) -> Self {
        Self {
            buf: Cow::Owned(Vec::with_capacity(hint)),
            offset: 0,
            capacity: None,
        }
    }

    /// A cursor that refuses to hold more than `capacity` bytes.
    pub fn fixed(capacity: usize) -> Self {
        Self {
            buf: Cow::Owned(Vec::with_capacity(capacity)),
            offset: 0,
            capacity: Some(capacity),
        }
    }
}

impl<'a> ByteCursor<'a> {
    /// Wrap existing bytes for reading. Writes may overwrite in place but
    /// cannot extend past the wrapped length.
    pub fn wrap(bytes: &'a [u8]) -> Self {
        Self {
            buf: Cow::Borrowed(bytes),
            offset: 0,
            capacity: Some(bytes.len()),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Move the cursor. The offset may not pass the written length.
    pub fn set_offset(&mut self, offset: usize) -> Result<()> {
        if offset > self.buf.len() {
            return Err(TraceError::BufferOverflow {
                requested: offset,
                remaining: self.buf.len(),
            });
        }
        self.offset = offset;
        Ok(())
    }

    /// Bytes left to read from the current offset.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Everything written (or wrapped) so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.into_owned()
    }

    // ── Raw access ─────────────────────────────────────────────────

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let end = self.offset + bytes.len();
        if let Some(capacity) = self.capacity {
            if end > capacity {
                return Err(TraceError::BufferOverflow {
                    requested: bytes.len(),
                    remaining: capacity.saturating_sub(self.offset),
                });
            }
        }
        let buf = self.buf.to_mut();
        let overlap = buf.len().min(end).saturating_sub(self.offset);
        buf[self.offset..self.offset + overlap].copy_from_slice(&bytes[..overlap]);
        buf.extend_from_slice(&bytes[overlap..]);
        self.offset = end;
        Ok(())
    }

    fn peek_raw(&self, len: usize) -> Result<&[u8]> {
        if len > self.remaining() {
            return Err(TraceError::MalformedEncoding(format!(
                "read of {} bytes at offset {} runs past end ({} bytes)",
                len,
                self.offset,
                self.buf.len()
            )));
        }
        Ok(&self.buf[self.offset..self.offset + len])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.peek_raw(N)?);
        self.offset += N;
        Ok(out)
    }

    /// Write bytes verbatim.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_raw(bytes)
    }

    /// Read exactly `len` bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.offset;
        self.peek_raw(len)?;
        self.offset += len;
        Ok(&self.buf[start..start + len])
    }

    /// Read everything from the offset to the end.
    pub fn get_remaining_bytes(&mut self) -> &[u8] {
        let start = self.offset;
        self.offset = self.buf.len();
        &self.buf[start..]
    }

    // ── Fixed width ────────────────────────────────────────────────

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    pub fn put_bool(&mut self, value: bool) -> Result<()> {
        self.put_u8(value as u8)
    }

    pub fn put_i16(&mut self, value: i16) -> Result<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn put_i64(&mut self, value: i64) -> Result<()> {
        self.write_raw(&value.to_be_bytes())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Strict boolean: only 0 and 1 are accepted.
    pub fn get_bool(&mut self) -> Result<bool> {
        let byte = self.peek_raw(1)?[0];
        match byte {
            0 => {
                self.offset += 1;
                Ok(false)
            }
            1 => {
                self.offset += 1;
                Ok(true)
            }
            other => Err(TraceError::MalformedEncoding(format!(
                "invalid boolean byte {:#04x}",
                other
            ))),
        }
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    /// Write the low `width` bytes of `value`, big-endian.
    ///
    /// `width` must be 1, 2, 4 or 8, and `value` must fit in it.
    pub fn put_fixed(&mut self, width: usize, value: u64) -> Result<()> {
        check_fixed_width(width)?;
        if width < 8 && value >> (width * 8) != 0 {
            return Err(TraceError::EncodingTooLarge {
                len: value_byte_len(value),
                max: width,
            });
        }
        let bytes = value.to_be_bytes();
        self.write_raw(&bytes[8 - width..])
    }

    /// Read a `width`-byte big-endian unsigned value.
    pub fn get_fixed(&mut self, width: usize) -> Result<u64> {
        check_fixed_width(width)?;
        let raw = self.peek_raw(width)?;
        let mut bytes = [0u8; 8];
        bytes[8 - width..].copy_from_slice(raw);
        self.offset += width;
        Ok(u64::from_be_bytes(bytes))
    }

    // ── Varints ────────────────────────────────────────────────────

    pub fn put_var_int(&mut self, value: u32) -> Result<()> {
        self.put_var_long(value as u64)
    }

    pub fn put_var_long(&mut self, value: u64) -> Result<()> {
        let mut scratch = Vec::with_capacity(10);
        encode_var64(&mut scratch, value);
        self.write_raw(&scratch)
    }

    pub fn put_svar_int(&mut self, value: i32) -> Result<()> {
        self.put_var_int(zigzag_encode_32(value))
    }

    pub fn put_svar_long(&mut self, value: i64) -> Result<()> {
        self.put_var_long(zigzag_encode_64(value))
    }

    pub fn get_var_int(&mut self) -> Result<u32> {
        let (value, len) = decode_var32(&self.buf[self.offset..])?;
        self.offset += len;
        Ok(value)
    }

    pub fn get_var_long(&mut self) -> Result<u64> {
        let (value, len) = decode_var64(&self.buf[self.offset..])?;
        self.offset += len;
        Ok(value)
    }

    pub fn get_svar_int(&mut self) -> Result<i32> {
        Ok(zigzag_decode_32(self.get_var_int()?))
    }

    pub fn get_svar_long(&mut self) -> Result<i64> {
        Ok(zigzag_decode_64(self.get_var_long()?))
    }

    // ── Length-prefixed payloads ───────────────────────────────────

    /// Write a fixed-width signed length prefix followed by the payload.
    /// `None` is written as the null sentinel with no payload.
    pub fn put_prefixed_bytes(&mut self, bytes: Option<&[u8]>, width: PrefixWidth) -> Result<()> {
        let bytes = match bytes {
            None => return self.put_length_prefix(NULL_LENGTH, width),
            Some(bytes) => bytes,
        };
        if bytes.len() > width.max_len() {
            return Err(TraceError::EncodingTooLarge {
                len: bytes.len(),
                max: width.max_len(),
            });
        }
        // Check the whole write up front so a failed put leaves no prefix behind.
        self.ensure_writable(width.bytes() + bytes.len())?;
        self.put_length_prefix(bytes.len() as i32, width)?;
        self.write_raw(bytes)
    }

    pub fn get_prefixed_bytes(&mut self, width: PrefixWidth) -> Result<Option<&[u8]>> {
        let start = self.offset;
        let len = match width {
            PrefixWidth::One => self.get_u8()? as i8 as i32,
            PrefixWidth::Two => self.get_i16()? as i32,
            PrefixWidth::Four => self.get_i32()?,
        };
        self.finish_prefixed_read(start, len)
    }

    pub fn put_prefixed_str(&mut self, value: Option<&str>, width: PrefixWidth) -> Result<()> {
        self.put_prefixed_bytes(value.map(str::as_bytes), width)
    }

    pub fn get_prefixed_string(&mut self, width: PrefixWidth) -> Result<Option<String>> {
        let start = self.offset;
        let bytes = self.get_prefixed_bytes(width)?.map(<[u8]>::to_vec);
        match bytes.map(String::from_utf8).transpose() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.offset = start;
                Err(TraceError::MalformedEncoding(
                    "prefixed string is not valid UTF-8".into(),
                ))
            }
        }
    }

    fn put_length_prefix(&mut self, len: i32, width: PrefixWidth) -> Result<()> {
        match width {
            PrefixWidth::One => self.put_u8(len as i8 as u8),
            PrefixWidth::Two => self.put_i16(len as i16),
            PrefixWidth::Four => self.put_i32(len),
        }
    }

    fn finish_prefixed_read(&mut self, start: usize, len: i32) -> Result<Option<&[u8]>> {
        if len == NULL_LENGTH {
            return Ok(None);
        }
        if len < 0 {
            self.offset = start;
            return Err(TraceError::MalformedEncoding(format!(
                "negative length prefix {}",
                len
            )));
        }
        let len = len as usize;
        if len > self.remaining() {
            let err = TraceError::MalformedEncoding(format!(
                "prefixed payload of {} bytes runs past end ({} remaining)",
                len,
                self.remaining()
            ));
            self.offset = start;
            return Err(err);
        }
        let payload_start = self.offset;
        self.offset += len;
        Ok(Some(&self.buf[payload_start..payload_start + len]))
    }

    fn ensure_writable(&self, len: usize) -> Result<()> {
        match self.capacity {
            Some(capacity) if self.offset + len > capacity => Err(TraceError::BufferOverflow {
                requested: len,
                remaining: capacity.saturating_sub(self.offset),
            }),
            _ => Ok(()),
        }
    }

    // ── Padded payloads ────────────────────────────────────────────

    /// Write `bytes` left-justified in a `total_width` slot, zero padded.
    pub fn put_padded(&mut self, bytes: &[u8], total_width: usize) -> Result<()> {
        if bytes.len() > total_width {
            return Err(TraceError::EncodingTooLarge {
                len: bytes.len(),
                max: total_width,
            });
        }
        self.ensure_writable(total_width)?;
        self.write_raw(bytes)?;
        self.write_raw(&vec![0u8; total_width - bytes.len()])
    }

    /// Read a `total_width` slot including its padding.
    pub fn get_padded(&mut self, total_width: usize) -> Result<&[u8]> {
        self.get_bytes(total_width)
    }

    /// Read a padded slot as UTF-8 with trailing NUL padding removed.
    pub fn get_padded_string(&mut self, total_width: usize) -> Result<String> {
        let start = self.offset;
        let raw = self.get_padded(total_width)?;
        let trimmed_len = raw.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        match std::str::from_utf8(&raw[..trimmed_len]) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => {
                self.offset = start;
                Err(TraceError::MalformedEncoding(
                    "padded string is not valid UTF-8".into(),
                ))
            }
        }
    }
}

fn check_fixed_width(width: usize) -> Result<()> {
    match width {
        1 | 2 | 4 | 8 => Ok(()),
        other => Err(TraceError::UnsupportedWidth(other)),
    }
}

fn value_byte_len(value: u64) -> usize {
    8 - (value.leading_zeros() as usize / 8)
}
