//! Pipelined (v3) packet structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    constants::v3::{ESC, HEADER_SIZE, MAX_PAYLOAD_SIZE, MIN_FRAME_SIZE, STX, TESC, TSTX},
    error::{Error, Result},
};

/// v3 transport packet
///
/// # Packet Structure
///
/// ```text
/// ┌───────┬───────────┬──────────┬───────────┬──────────────────┬─────────┐
/// │  STX  │ LEN_LOW7  │ LEN_HIGH │ PACKET_ID │ PAYLOAD          │  CRC8   │
/// │ 1 byte│  1 byte   │  1 byte  │  1 byte   │ escaped, LEN     │ 1 byte  │
/// │ 0xFE  │ bit7 = 0  │          │           │ logical bytes    │ escaped │
/// └───────┴───────────┴──────────┴───────────┴──────────────────┴─────────┘
/// ```
///
/// `STX` and `ESC` inside the payload (and a checksum equal to either) are
/// sent as `ESC TSTX` / `ESC TESC`. The length field counts unescaped bytes.
///
/// # Examples
///
/// ```
/// use kassa_core::Packet;
///
/// let packet = Packet::new(1, vec![0xFE, 0x42]);
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(&encoded).unwrap();
/// assert_eq!(packet, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Packet identifier
    pub id: u8,

    /// Unescaped payload
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Create a packet with an empty payload
    ///
    /// Sent by either side to request retransmission of packet `id`.
    pub fn empty(id: u8) -> Self {
        Self::new(id, Bytes::new())
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u8 {
        checksum::crc8(self.id, &self.payload)
    }

    /// Encode packet to bytes
    ///
    /// The payload must fit the length field; use [`Packet::try_encode`] for
    /// caller-supplied data.
    pub fn encode(&self) -> BytesMut {
        let len = self.payload.len();
        let escapes = self.payload.iter().filter(|&&b| b == STX || b == ESC).count();
        let mut buf = BytesMut::with_capacity(MIN_FRAME_SIZE + len + escapes + 1);

        buf.put_u8(STX);
        buf.put_u8((len & 0x7F) as u8);
        buf.put_u8((len >> 7) as u8);
        buf.put_u8(self.id);

        for &b in self.payload.iter() {
            put_escaped(&mut buf, b);
        }
        put_escaped(&mut buf, self.checksum());

        buf
    }

    /// Encode packet to bytes, checking the payload fits the length field
    pub fn try_encode(&self) -> Result<BytesMut> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        Ok(self.encode())
    }

    /// Decode a single raw frame
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Frame is shorter than header plus checksum
    /// - First byte is not `STX`
    /// - An escape marker is followed by an unknown token
    /// - Declared length differs from the unescaped payload length
    /// - Checksum verification fails
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < MIN_FRAME_SIZE {
            return Err(Error::FrameTooShort {
                expected: MIN_FRAME_SIZE,
                actual: raw.len(),
            });
        }
        if raw[0] != STX {
            return Err(Error::InvalidStart(raw[0]));
        }

        let declared = declared_len(raw[1], raw[2]);
        let id = raw[3];

        // Unescape everything after the header; the last logical byte is the CRC
        let mut body = BytesMut::with_capacity(raw.len() - HEADER_SIZE);
        let mut i = HEADER_SIZE;
        while i < raw.len() {
            let b = raw[i];
            if b == ESC {
                let token = *raw.get(i + 1).ok_or(Error::InvalidEscape {
                    offset: i,
                    token: ESC,
                })?;
                body.put_u8(match token {
                    TSTX => STX,
                    TESC => ESC,
                    _ => return Err(Error::InvalidEscape { offset: i, token }),
                });
                i += 2;
            } else {
                body.put_u8(b);
                i += 1;
            }
        }

        let actual = body.len().saturating_sub(1);
        if body.is_empty() || actual != declared {
            return Err(Error::LengthMismatch { declared, actual });
        }

        let received = body[actual];
        let payload = body.split_to(actual).freeze();
        let expected = checksum::crc8(id, &payload);
        if expected != received {
            return Err(Error::ChecksumMismatch { expected, received });
        }

        Ok(Self { id, payload })
    }

    /// Read the packet id of a raw frame without validating it
    pub fn peek_id(raw: &[u8]) -> Option<u8> {
        raw.get(3).copied()
    }

    /// Check if this is a retransmission request
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Decode the split 7+8 bit length field
pub fn declared_len(low: u8, high: u8) -> usize {
    (low & 0x7F) as usize | ((high as usize) << 7)
}

fn put_escaped(buf: &mut BytesMut, b: u8) {
    match b {
        STX => {
            buf.put_u8(ESC);
            buf.put_u8(TSTX);
        }
        ESC => {
            buf.put_u8(ESC);
            buf.put_u8(TESC);
        }
        _ => buf.put_u8(b),
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id)
            .field("checksum", &format!("0x{:02X}", self.checksum()))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packet[{}](len={})", self.id, self.payload.len())
    }
}
