//! Frame checksums
//!
//! Two algorithms, one per protocol generation:
//! - v3: CRC8 with polynomial 0x31 (X^8+X^5+X^4+X^0), seeded with the packet id
//! - v2: plain XOR over the frame interior

use tracing::trace;

/// CRC8 polynomial (X^8+X^5+X^4+X^0)
pub const CRC8_POLY: u8 = 0x31;

/// CRC8 initial value before the packet id is folded in
pub const CRC8_INIT: u8 = 0xFF;

#[inline]
fn rounds(mut crc: u8) -> u8 {
    for _ in 0..8 {
        crc = if crc & 0x80 != 0 {
            (crc << 1) ^ CRC8_POLY
        } else {
            crc << 1
        };
    }
    crc
}

/// Calculate the v3 packet checksum
///
/// # Algorithm
///
/// ```text
/// 1. crc = 0xFF ^ packet_id
/// 2. Run 8 shift-xor rounds on the seed
/// 3. For every unescaped payload byte: crc ^= b, then 8 rounds
/// ```
///
/// # Examples
///
/// ```
/// use kassa_core::checksum;
///
/// assert_eq!(checksum::crc8(1, &[]), 0x9D);
/// ```
pub fn crc8(packet_id: u8, payload: &[u8]) -> u8 {
    let crc = payload
        .iter()
        .fold(rounds(CRC8_INIT ^ packet_id), |crc, &b| rounds(crc ^ b));

    trace!(
        packet_id = packet_id,
        payload_len = payload.len(),
        crc = format!("0x{:02X}", crc),
        "Calculated CRC8"
    );

    crc
}

/// Calculate the v2 XOR checksum over `bytes`
pub fn xor(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, &b| acc ^ b)
}
