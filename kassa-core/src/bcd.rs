//! Packed binary-coded decimal
//!
//! Numbers are stored big-endian, two decimal digits per byte
//! (`123` in 2 bytes is `01 23`).

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Encode `value` into exactly `len` BCD bytes
///
/// # Errors
///
/// Returns [`Error::ValueOutOfRange`] if `value` has more than `2 * len`
/// decimal digits.
///
/// # Examples
///
/// ```
/// use kassa_core::bcd;
///
/// assert_eq!(bcd::encode(123, 2).unwrap().as_ref(), &[0x01, 0x23]);
/// assert!(bcd::encode(123, 1).is_err());
/// ```
pub fn encode(value: u64, len: usize) -> Result<BytesMut> {
    let mut digits = [0u8; 32];
    let mut rest = value;
    for slot in digits.iter_mut().rev().take(len.min(16)) {
        let low = (rest % 10) as u8;
        rest /= 10;
        let high = (rest % 10) as u8;
        rest /= 10;
        *slot = (high << 4) | low;
    }

    if rest != 0 {
        return Err(Error::ValueOutOfRange { value, len });
    }

    let mut buf = BytesMut::with_capacity(len);
    // Widths beyond 16 bytes only add leading zeros
    buf.put_bytes(0, len.saturating_sub(16));
    buf.put_slice(&digits[32 - len.min(16)..]);
    Ok(buf)
}

/// Decode a big-endian BCD number
pub fn decode(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| acc.wrapping_mul(100).wrapping_add(decode_byte(b) as u64))
}

/// Decode a single BCD byte (`0x42` → `42`)
pub fn decode_byte(b: u8) -> u8 {
    (b >> 4) * 10 + (b & 0x0F)
}
