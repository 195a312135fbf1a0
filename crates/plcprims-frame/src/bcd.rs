//! Packed-BCD and date/time conversions used by the frame header.
//!
//! The PLC stores every calendar field as two decimal digits packed into one
//! byte (high nibble = tens, low nibble = units). A byte is therefore *read*
//! by interpreting its hex digits as decimal digits: `0x17` is 17, not 23.

use std::fmt::Write as _;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::error::{FrameError, Result};
use crate::frame::Frame;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Encode a one or two digit decimal string as a packed-BCD byte.
///
/// A single digit is treated as the units digit (`"7"` → `0x07`).
pub fn string_to_packed_bcd(input: &str) -> Result<u8> {
    let bytes = input.as_bytes();
    if bytes.is_empty() || bytes.len() > 2 {
        return Err(FrameError::InvalidBcdInput(format!(
            "expected 1 or 2 digits, got {:?}",
            input
        )));
    }
    if !bytes.iter().all(u8::is_ascii_digit) {
        return Err(FrameError::InvalidBcdInput(format!(
            "non-decimal characters in {:?}",
            input
        )));
    }

    let (tens, units) = match bytes {
        [units] => (0, units - b'0'),
        [tens, units] => (tens - b'0', units - b'0'),
        _ => unreachable!("length checked above"),
    };
    Ok((tens << 4) | units)
}

/// Decode a packed-BCD byte by reading its hex digits as decimal digits.
pub fn packed_bcd_to_int(packed: u8) -> Result<u8> {
    let tens = packed >> 4;
    let units = packed & 0x0F;
    if tens > 9 || units > 9 {
        return Err(FrameError::InvalidBcdInput(format!(
            "0x{packed:02x} is not packed BCD"
        )));
    }
    Ok(tens * 10 + units)
}

/// Encode an integer in `0..=99` as packed BCD.
pub fn int_to_packed_bcd(value: u8) -> Result<u8> {
    if value > 99 {
        return Err(FrameError::InvalidBcdInput(format!(
            "{value} does not fit in two digits"
        )));
    }
    Ok(pack(value))
}

fn pack(value: u8) -> u8 {
    debug_assert!(value < 100);
    ((value / 10) << 4) | (value % 10)
}

/// Render bytes as a space separated `0x..` dump for diagnostics.
pub fn to_hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 5);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "0x{byte:02x}");
    }
    out
}

/// The eight raw date/time bytes at the start of every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimestampFields {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Hundreds and tens of milliseconds, packed BCD.
    pub millis_high: u8,
    /// Units of milliseconds in the high nibble, weekday code (1=Sunday) in the low nibble.
    pub millis_low_weekday: u8,
}

impl TimestampFields {
    pub const SIZE: usize = 8;

    pub fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self {
            year: bytes[0],
            month: bytes[1],
            day: bytes[2],
            hour: bytes[3],
            minute: bytes[4],
            second: bytes[5],
            millis_high: bytes[6],
            millis_low_weekday: bytes[7],
        }
    }

    pub fn to_bytes(self) -> [u8; Self::SIZE] {
        [
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.millis_high,
            self.millis_low_weekday,
        ]
    }

    /// Weekday code stored in the low nibble of the last byte (1=Sunday .. 7=Saturday).
    pub fn weekday_code(&self) -> u8 {
        self.millis_low_weekday & 0x0F
    }

    /// Milliseconds encoded across the last two bytes.
    pub fn millis(&self) -> Result<u16> {
        let high = packed_bcd_to_int(self.millis_high)?;
        let low = self.millis_low_weekday >> 4;
        if low > 9 {
            return Err(FrameError::InvalidBcdInput(format!(
                "0x{:02x} is not a millisecond digit",
                self.millis_low_weekday
            )));
        }
        Ok(u16::from(high) * 10 + u16::from(low))
    }
}

/// Capture a local instant as protocol date/time fields.
pub fn encode_timestamp(instant: &DateTime<Local>) -> TimestampFields {
    let millis = instant.timestamp_subsec_millis().min(999);
    let weekday = instant.weekday().number_from_sunday() as u8;

    TimestampFields {
        year: pack((instant.year().rem_euclid(100)) as u8),
        month: pack(instant.month() as u8),
        day: pack(instant.day() as u8),
        hour: pack(instant.hour() as u8),
        minute: pack(instant.minute() as u8),
        second: pack(instant.second() as u8),
        millis_high: pack((millis / 10) as u8),
        millis_low_weekday: (((millis % 10) as u8) << 4) | weekday,
    }
}

/// Rebuild the local instant described by protocol date/time fields.
///
/// The year is stored as an offset from 2000 and the month is 1-based.
pub fn decode_timestamp(fields: &TimestampFields) -> Result<DateTime<Local>> {
    let year = 2000 + i32::from(packed_bcd_to_int(fields.year)?);
    let month = u32::from(packed_bcd_to_int(fields.month)?);
    let day = u32::from(packed_bcd_to_int(fields.day)?);
    let hour = u32::from(packed_bcd_to_int(fields.hour)?);
    let minute = u32::from(packed_bcd_to_int(fields.minute)?);
    let second = u32::from(packed_bcd_to_int(fields.second)?);
    let millis = fields.millis()?;

    let base = Local
        .with_ymd_and_hms(year, month, day, hour, minute, second)
        .earliest()
        .ok_or(FrameError::InvalidTimestamp)?;
    Ok(base + chrono::Duration::milliseconds(i64::from(millis)))
}

/// Format the header timestamp of `frame` as `Www Mon DD HH:MM:SS,mmm YYYY`.
///
/// Fields are printed digit-for-digit from their BCD bytes; unknown weekday or
/// month codes render as `???`.
pub fn format_frame_timestamp(frame: &Frame) -> String {
    let fields = frame.timestamp_fields();
    let weekday = usize::from(fields.weekday_code())
        .checked_sub(1)
        .and_then(|i| WEEKDAYS.get(i))
        .copied()
        .unwrap_or("???");
    let month = packed_bcd_to_int(fields.month)
        .ok()
        .and_then(|m| usize::from(m).checked_sub(1))
        .and_then(|i| MONTHS.get(i))
        .copied()
        .unwrap_or("???");

    format!(
        "{weekday} {month} {:02x} {:02x}:{:02x}:{:02x},{:02x}{:x} 20{:02x}",
        fields.day,
        fields.hour,
        fields.minute,
        fields.second,
        fields.millis_high,
        fields.millis_low_weekday >> 4,
        fields.year,
    )
}
