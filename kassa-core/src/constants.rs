//! Protocol constants

/// Largest packet and task identifier; counters wrap to 0 after it
pub const MAX_ID: u8 = 0xDF;

/// Number of distinct identifiers (0..=MAX_ID)
pub const ID_SPACE: usize = MAX_ID as usize + 1;

/// Packet id the device uses for out-of-band (asynchronous) notifications
pub const ASYNC_PACKET_ID: u8 = 0xF0;

/// Default network port of the device
pub const DEFAULT_PORT: u16 = 5555;

/// Default command timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Response code of a generic command answer (`'U'`)
pub const RESPONSE_CODE: u8 = 0x55;

/// Error code meaning "no error"
pub const NO_ERROR: u8 = 0x00;

/// Control symbols of the pipelined (v3) protocol
pub mod v3 {
    /// Frame start
    pub const STX: u8 = 0xFE;

    /// Escape marker
    pub const ESC: u8 = 0xFD;

    /// Escaped form of `STX`
    pub const TSTX: u8 = 0xEE;

    /// Escaped form of `ESC`
    pub const TESC: u8 = 0xED;

    /// Bytes before the payload: STX, two length bytes, packet id
    pub const HEADER_SIZE: usize = 4;

    /// Smallest physical frame: header plus checksum
    pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1;

    /// Largest payload the split 7+8 bit length field can describe
    pub const MAX_PAYLOAD_SIZE: usize = 0x7F | (0xFF << 7);
}

/// Control symbols of the legacy half-duplex (v2) protocol
pub mod v2 {
    /// Frame start
    pub const STX: u8 = 0x02;

    /// Frame end
    pub const ETX: u8 = 0x03;

    /// End of transmission
    pub const EOT: u8 = 0x04;

    /// Enquiry (request to transmit)
    pub const ENQ: u8 = 0x05;

    /// Positive acknowledgement
    pub const ACK: u8 = 0x06;

    /// Escape (data link escape)
    pub const DLE: u8 = 0x10;

    /// Negative acknowledgement
    pub const NAK: u8 = 0x15;

    /// Handshake attempts (ENQ until ACK)
    pub const HANDSHAKE_ATTEMPTS: usize = 5;

    /// Frame transfer attempts (frame until ACK)
    pub const TRANSFER_ATTEMPTS: usize = 10;

    /// Turnaround attempts (wait for ENQ)
    pub const TURNAROUND_ATTEMPTS: usize = 5;

    /// Receive attempts (NAK on bad checksum)
    pub const RECEIVE_ATTEMPTS: usize = 10;
}

/// Device opcodes the session itself relies on
pub mod opcodes {
    /// Device state request
    pub const DEVICE_STATE: u8 = 0x3F;

    /// Exit current mode
    pub const RESET_MODE: u8 = 0x48;

    /// Cancel the open bill
    pub const CANCEL_BILL: u8 = 0x59;

    /// Device type request
    pub const DEVICE_TYPE: u8 = 0xA5;
}
