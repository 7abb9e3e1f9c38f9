//! Error types for kassa-core



/// Result type alias for kassa-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core wire-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Frame is too short to be valid
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not begin with the start marker
    #[error("Invalid start marker: 0x{0:02X}")]
    InvalidStart(u8),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ChecksumMismatch {
        expected: u8,
        received: u8,
    },

    /// Declared payload length disagrees with the physical frame
    #[error("Length mismatch: declared {declared} bytes, frame carries {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// Escape marker followed by an unknown token
    #[error("Invalid escape sequence at offset {offset}: 0x{token:02X}")]
    InvalidEscape {
        offset: usize,
        token: u8,
    },

    /// Payload does not fit into the 15-bit length field
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Buffer access beyond the stored bytes
    #[error("Out of bounds: requested {requested} bytes, {available} available")]
    OutOfBounds {
        requested: usize,
        available: usize,
    },

    /// Number does not fit into the requested BCD width
    #[error("Value {value} does not fit into {len} BCD bytes")]
    ValueOutOfRange {
        value: u64,
        len: usize,
    },

    /// Unknown transport opcode
    #[error("Unknown opcode: 0x{0:02X}")]
    UnknownOpcode(u8),

    /// Unknown task status
    #[error("Unknown status: 0x{0:02X}")]
    UnknownStatus(u8),
}

impl Error {
    /// Check if the fault is local to a single frame (the stream stays usable)
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::FrameTooShort { .. }
                | Self::InvalidStart(_)
                | Self::ChecksumMismatch { .. }
                | Self::LengthMismatch { .. }
                | Self::InvalidEscape { .. }
        )
    }
}
