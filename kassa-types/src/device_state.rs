//! Device state (answer to `0x3F`)

use bitflags::bitflags;
use chrono::{NaiveDate, NaiveDateTime};
use kassa_core::{bcd, constants::RESPONSE_CODE};

use crate::{
    error::{Error, Result},
    result::DeviceResult,
};

/// Length of a device state answer
pub const STATE_LEN: usize = 30;

bitflags! {
    /// Device status flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StateFlags: u8 {
        const FISCALIZED = 0x01;
        const SHIFT_OPEN = 0x02;
        const CASH_DRAWER_OPEN = 0x04;
        const PAPER_PRESENT = 0x08;
        const COVER_OPEN = 0x20;
        const FISCAL_STORAGE_ACTIVE = 0x40;
        const BATTERY_LOW = 0x80;
    }
}

/// Snapshot of the device state
///
/// # Layout
///
/// ```text
/// 0      response code ('D')
/// 1      cashier (BCD)          2      number in placement
/// 3..6   date YY MM DD (BCD)    6..9   time hh mm ss (BCD)
/// 9      flags                  10..14 serial number (BCD)
/// 14     model                  17     mode (low nibble), sub-mode (high nibble)
/// 18..20 bill number (BCD)      20..22 shift number (BCD)
/// 22     bill state             23..28 bill sum (BCD)
/// 28     decimal point position 29     port type
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub response_code: u8,
    pub cashier: u8,
    pub number_in_placement: u8,
    /// Device clock; `None` if the device reports an impossible date
    pub clock: Option<NaiveDateTime>,
    pub flags: StateFlags,
    pub serial_number: u32,
    pub model: u8,
    /// Current mode; 0 is the mode selection state
    pub mode: u8,
    pub sub_mode: u8,
    pub bill_number: u16,
    pub shift_number: u16,
    /// Non-zero while a bill is open
    pub bill_state: u8,
    pub bill_sum: u64,
    pub scale: u8,
    pub port_type: u8,
}

impl DeviceState {
    /// Parse a device state answer
    ///
    /// A short answer starting with the generic response code is the device
    /// refusing the request and yields [`Error::Device`].
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < STATE_LEN {
            if buf.first() == Some(&RESPONSE_CODE) {
                let code = |i: usize| buf.get(i).copied().unwrap_or_default();
                return Err(Error::Device(DeviceResult::new(RESPONSE_CODE, code(1), code(2))));
            }
            return Err(Error::TooShort {
                expected: STATE_LEN,
                actual: buf.len(),
            });
        }

        let digits = |i: usize| bcd::decode_byte(buf[i]) as u32;
        let clock = NaiveDate::from_ymd_opt(2000 + digits(3) as i32, digits(4), digits(5))
            .and_then(|date| date.and_hms_opt(digits(6), digits(7), digits(8)));

        Ok(Self {
            response_code: buf[0],
            cashier: bcd::decode_byte(buf[1]),
            number_in_placement: buf[2],
            clock,
            flags: StateFlags::from_bits_retain(buf[9]),
            serial_number: bcd::decode(&buf[10..14]) as u32,
            model: buf[14],
            mode: buf[17] & 0x0F,
            sub_mode: buf[17] >> 4,
            bill_number: bcd::decode(&buf[18..20]) as u16,
            shift_number: bcd::decode(&buf[20..22]) as u16,
            bill_state: buf[22],
            bill_sum: bcd::decode(&buf[23..28]),
            scale: buf[28],
            port_type: buf[29],
        })
    }

    /// Check if the device is in the mode selection state
    pub fn is_selecting(&self) -> bool {
        self.mode == 0
    }

    pub fn has_open_bill(&self) -> bool {
        self.bill_state != 0
    }

    pub fn is_shift_open(&self) -> bool {
        self.flags.contains(StateFlags::SHIFT_OPEN)
    }

    pub fn is_battery_ok(&self) -> bool {
        !self.flags.contains(StateFlags::BATTERY_LOW)
    }
}
