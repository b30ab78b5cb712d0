//! Variable-length integer encoding utilities.
//!
//! LEB128-style encoding: seven payload bits per byte, high bit set on every
//! byte except the last. Used for document id deltas, frequencies and
//! positions in the posting block.

use crate::error::{QuarryError, Result};

/// Maximum number of bytes a u64 can occupy once encoded.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the encoding of `value` to `out`.
pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    let mut val = value;
    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;
        if val != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VARINT_LEN);
    write_u64(&mut bytes, value);
    bytes
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;

    for (index, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(QuarryError::index("varint overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, index + 1));
        }

        shift += 7;
    }

    Err(QuarryError::index("incomplete varint"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_u64() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for &value in &test_values {
            let encoded = encode_u64(value);
            let (decoded, bytes_read) = decode_u64(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
        }
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u64(127).len(), 1);
        assert_eq!(encode_u64(128).len(), 2);
        assert!(encode_u64(u64::MAX).len() <= MAX_VARINT_LEN);
    }

    #[test]
    fn test_incomplete_varint() {
        let incomplete = vec![0x80];
        assert!(decode_u64(&incomplete).is_err());
    }

    #[test]
    fn test_overflow() {
        let overflow_data = vec![0xFF; 20];
        assert!(decode_u64(&overflow_data).is_err());
    }
}
