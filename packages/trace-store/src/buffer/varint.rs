//! Variable-length integer primitives (LEB128 + zig-zag).
//!
//! Each byte carries 7 data bits; the high bit is the continuation flag.
//! A 32-bit value occupies 1–5 bytes, a 64-bit value 1–10 bytes.
//!
//! Signed values are zig-zag mapped first so small magnitudes stay short:
//! 0 → 0, -1 → 1, 1 → 2, -2 → 3, ...
//!
//! Decoders return the value and the number of bytes consumed, and reject
//! sequences that run past the input, exceed the width's byte budget, or
//! carry bits beyond the declared width. A malformed varint is never
//! reinterpreted as a smaller value.

use crate::error::{Result, TraceError};

/// Maximum encoded length of a 32-bit varint.
pub const MAX_VAR32_LEN: usize = 5;

/// Maximum encoded length of a 64-bit varint.
pub const MAX_VAR64_LEN: usize = 10;

#[inline]
pub fn zigzag_encode_32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn zigzag_decode_32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

#[inline]
pub fn zigzag_encode_64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn zigzag_decode_64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encoded length of an unsigned 32-bit varint.
pub fn var32_size(value: u32) -> usize {
    var64_size(value as u64)
}

/// Encoded length of an unsigned 64-bit varint.
pub fn var64_size(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Encoded length of a zig-zag signed 32-bit varint.
pub fn svar32_size(value: i32) -> usize {
    var32_size(zigzag_encode_32(value))
}

/// Encoded length of a zig-zag signed 64-bit varint.
pub fn svar64_size(value: i64) -> usize {
    var64_size(zigzag_encode_64(value))
}

/// Append an unsigned varint to `out`.
pub fn encode_var64(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode an unsigned 32-bit varint from the start of `bytes`.
pub fn decode_var32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, len) = decode_var(bytes, MAX_VAR32_LEN, 32)?;
    Ok((value as u32, len))
}

/// Decode an unsigned 64-bit varint from the start of `bytes`.
pub fn decode_var64(bytes: &[u8]) -> Result<(u64, usize)> {
    decode_var(bytes, MAX_VAR64_LEN, 64)
}

fn decode_var(bytes: &[u8], max_len: usize, width_bits: u32) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i >= max_len {
            break;
        }
        let shift = 7 * i as u32;
        let data = (byte & 0x7F) as u64;
        // Final byte may only carry the bits left in the declared width.
        if i == max_len - 1 {
            let remaining_bits = width_bits - shift;
            if byte & 0x80 != 0 || data >> remaining_bits != 0 {
                return Err(TraceError::MalformedEncoding(format!(
                    "varint exceeds {} bits",
                    width_bits
                )));
            }
        }
        value |= data << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if bytes.len() < max_len {
        Err(TraceError::MalformedEncoding(
            "varint truncated at end of buffer".into(),
        ))
    } else {
        Err(TraceError::MalformedEncoding(format!(
            "varint longer than {} bytes",
            max_len
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        encode_var64(&mut out, value);
        out
    }

    #[test]
    fn test_zigzag_pattern() {
        let pairs: [(i32, u32); 7] = [
            (0, 0),
            (-1, 1),
            (1, 2),
            (-2, 3),
            (2, 4),
            (i32::MAX, u32::MAX - 1),
            (i32::MIN, u32::MAX),
        ];
        for (signed, unsigned) in pairs {
            assert_eq!(zigzag_encode_32(signed), unsigned);
            assert_eq!(zigzag_decode_32(unsigned), signed);
        }
        assert_eq!(zigzag_encode_64(i64::MIN), u64::MAX);
        assert_eq!(zigzag_decode_64(u64::MAX), i64::MIN);
        assert_eq!(zigzag_decode_64(zigzag_encode_64(-42)), -42);
    }

    #[test]
    fn test_var_size_boundaries() {
        let cases: [(u64, usize); 8] = [
            (0, 1),
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (268_435_455, 4),
            (268_435_456, 5),
            (u64::MAX, 10),
        ];
        for (value, len) in cases {
            assert_eq!(var64_size(value), len, "size of {}", value);
            assert_eq!(encoded(value).len(), len, "encoded length of {}", value);
        }
        assert_eq!(var32_size(i32::MAX as u32), 5);
        assert_eq!(svar32_size(-1), 1);
        assert_eq!(svar32_size(63), 1);
        assert_eq!(svar32_size(64), 2);
        assert_eq!(svar64_size(i64::MIN), 10);
    }

    #[test]
    fn test_decode_roundtrip_consumes_exact_length() {
        for value in [0u64, 1, 127, 128, 300, 16_384, u32::MAX as u64, u64::MAX] {
            let bytes = encoded(value);
            let (decoded, len) = decode_var64(&bytes).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(len, bytes.len());
        }
    }

    #[test]
    fn test_decode_var32_rejects_overwide_final_byte() {
        // 5th byte may only use the low 4 bits for a 32-bit value.
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        assert!(decode_var32(&bytes).is_err());

        let max = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        assert_eq!(decode_var32(&max).unwrap(), (u32::MAX, 5));
    }

    #[test]
    fn test_decode_rejects_six_byte_var32() {
        let bytes = [0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        let err = decode_var32(&bytes).unwrap_err();
        assert!(matches!(err, TraceError::MalformedEncoding(_)));
    }

    #[test]
    fn test_decode_rejects_eleven_byte_var64() {
        let bytes = [0x80u8; 11];
        assert!(decode_var64(&bytes).is_err());

        let mut max = vec![0xFFu8; 9];
        max.push(0x01);
        assert_eq!(decode_var64(&max).unwrap(), (u64::MAX, 10));
    }

    #[test]
    fn test_decode_truncated() {
        let err = decode_var64(&[0x80, 0x80]).unwrap_err();
        assert!(err.to_string().contains("truncated"), "unexpected: {}", err);
        assert!(decode_var32(&[]).is_err());
    }
}
