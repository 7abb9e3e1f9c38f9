//! Legacy half-duplex (v2) frame encoding/decoding
//!
//! ```text
//! STX | payload (ETX, DLE preceded by DLE) | ETX | XOR(everything between STX and the checksum)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    checksum,
    constants::v2::{DLE, ETX, STX},
    error::{Error, Result},
};

/// Wrap a payload into a v2 frame
///
/// # Examples
///
/// ```
/// use kassa_core::frame;
///
/// let framed = frame::wrap(&[0x1F, 0x03]);
/// assert_eq!(framed.as_ref(), &[0x02, 0x1F, 0x10, 0x03, 0x03, 0x0F]);
/// ```
pub fn wrap(payload: &[u8]) -> Bytes {
    let escapes = payload.iter().filter(|&&b| b == ETX || b == DLE).count();
    let mut buf = BytesMut::with_capacity(payload.len() + escapes + 3);

    buf.put_u8(STX);
    for &b in payload {
        if b == ETX || b == DLE {
            buf.put_u8(DLE);
        }
        buf.put_u8(b);
    }
    buf.put_u8(ETX);

    let crc = checksum::xor(&buf[1..]);
    buf.put_u8(crc);

    buf.freeze()
}

/// Strip markers and escapes from a complete v2 frame
///
/// The checksum is not verified; see [`check`].
pub fn unwrap(frame: &[u8]) -> Result<Bytes> {
    let end = frame_end(frame).ok_or(Error::FrameTooShort {
        expected: 3,
        actual: frame.len(),
    })?;

    // end points past the checksum; the interior stops before ETX
    let interior = &frame[1..end - 2];
    let mut out = BytesMut::with_capacity(interior.len());
    let mut escaped = false;
    for &b in interior {
        if b == DLE && !escaped {
            escaped = true;
            continue;
        }
        escaped = false;
        out.put_u8(b);
    }

    Ok(out.freeze())
}

/// Verify the trailing XOR checksum of a frame
///
/// True when the last byte equals the XOR of all bytes between the start
/// marker and the checksum.
pub fn check(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let last = frame.len() - 1;
    checksum::xor(&frame[1..last]) == frame[last]
}

/// Length of the first complete frame at the front of `buf`
///
/// A frame is complete once an unescaped `ETX` and the checksum byte after it
/// are present. `buf` must start with `STX`.
pub fn frame_end(buf: &[u8]) -> Option<usize> {
    if buf.first() != Some(&STX) {
        return None;
    }

    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate().skip(1) {
        if escaped {
            escaped = false;
        } else if b == DLE {
            escaped = true;
        } else if b == ETX {
            return if i + 1 < buf.len() { Some(i + 2) } else { None };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const DATA: [u8; 7] = [0x1F, 0x00, 0xFF, 0x10, 0x02, 0x03, 0x1A];
    const FRAME: [u8; 12] = [
        0x02, 0x1F, 0x00, 0xFF, 0x10, 0x10, 0x02, 0x10, 0x03, 0x1A, 0x03, 0xE8,
    ];

    #[test]
    fn test_wrap_vector() {
        assert_eq!(wrap(&DATA).as_ref(), &FRAME);
    }

    #[test]
    fn test_unwrap_vector() {
        assert_eq!(unwrap(&FRAME).unwrap().as_ref(), &DATA);
    }

    #[test]
    fn test_check() {
        assert!(check(&FRAME));

        let mut bad = FRAME;
        bad[11] = 0xE7;
        assert!(!check(&bad));
    }

    #[test]
    fn test_check_detects_any_bit_flip() {
        for byte in 0..FRAME.len() {
            for bit in 0..8 {
                let mut flipped = FRAME;
                flipped[byte] ^= 1 << bit;
                // The start marker is not covered by the checksum
                if byte == 0 {
                    continue;
                }
                assert!(!check(&flipped), "flip at byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn test_frame_end() {
        assert_eq!(frame_end(&FRAME), Some(FRAME.len()));
        assert_eq!(frame_end(&FRAME[..11]), None);
        // Escaped ETX inside the payload is not the terminator
        assert_eq!(frame_end(&FRAME[..9]), None);

        let mut trailing = FRAME.to_vec();
        trailing.push(0x04);
        assert_eq!(frame_end(&trailing), Some(FRAME.len()));
    }

    #[test]
    fn test_empty_payload() {
        let framed = wrap(&[]);
        assert_eq!(framed.as_ref(), &[STX, ETX, ETX]);
        assert!(check(&framed));
        assert!(unwrap(&framed).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let framed = wrap(&payload);
            prop_assert!(check(&framed));
            prop_assert_eq!(frame_end(&framed), Some(framed.len()));
            let unwrapped = unwrap(&framed).unwrap();
            prop_assert_eq!(unwrapped.as_ref(), payload.as_slice());
        }
    }
}
