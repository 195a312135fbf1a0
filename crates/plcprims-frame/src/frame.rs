use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::bcd::{decode_timestamp, encode_timestamp, to_hex_string, TimestampFields};
use crate::error::{FrameError, Result};

/// Size of a frame without the optional size prefix.
pub const FRAME_SIZE: usize = 240;

/// Length of the big-endian size prefix some PLC families expect.
pub const SIZE_PREFIX_LEN: usize = 2;

/// Header bytes in front of the data area.
pub const HEADER_SIZE: usize = 16;

/// Size of the general data area.
pub const DATA_AREA_SIZE: usize = FRAME_SIZE - HEADER_SIZE;

/// Highest 1-based word index accepted by the word accessors.
pub const MAX_WORD_INDEX: usize = 111;

/// Highest 1-based dword index accepted by the dword accessors.
pub const MAX_DWORD_INDEX: usize = DATA_AREA_SIZE / 4;

/// End-of-text marker terminating string payloads.
pub const END_OF_TEXT: u8 = 0x03;

const MESSAGE_TYPE: usize = 8;
const DATA_TYPE: usize = 9;
const DATA_START_NUMBER: usize = 10;
const DATA_OFFSET: usize = 12;
const SEQUENCE_NUMBER: usize = 14;
const RETRY_COUNT: usize = 15;

// Positions inside the data area.
const SYNC_TYPE: usize = 8;
const CONFIG_SLAVES: usize = 14;
const MAX_SLAVES: usize = DATA_AREA_SIZE - CONFIG_SLAVES;

const SYNC_LEAD_MS: i64 = 1000;
const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Selects whether the frame carries the 2-byte size prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLayout {
    /// Header starts at byte 0 (ISO-on-TCP family).
    Plain,
    /// Two-byte size prefix, header starts at byte 2 (direct framing family).
    SizePrefixed,
}

impl FrameLayout {
    /// Offset of the first header byte.
    pub fn header_offset(self) -> usize {
        match self {
            FrameLayout::Plain => 0,
            FrameLayout::SizePrefixed => SIZE_PREFIX_LEN,
        }
    }

    /// Total buffer size for this layout.
    pub fn capacity(self) -> usize {
        FRAME_SIZE + self.header_offset()
    }
}

/// Clock synchronisation method announced to the PLC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncType {
    Ntp = 0x00,
    Plc = 0x01,
}

/// Counters and slave list carried by the INIT message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlcConfig {
    pub bool_read_length: u16,
    pub analog_read_length: u16,
    pub bool_inputs: u16,
    pub analog_inputs: u16,
    pub bool_commands: u16,
    pub analog_commands: u16,
    /// One address byte per DP slave; the slave count is derived from its length.
    pub slave_addresses: Vec<u8>,
}

/// One protocol message over a fixed-size byte buffer.
///
/// Layout relative to the header offset:
///
/// ```text
/// 0 year | 1 month | 2 day | 3 hour | 4 min | 5 sec | 6 ms-hi | 7 ms-lo<<4|weekday
/// 8 msg type | 9 data type | 10..12 data start (BE) | 12..14 data offset (BE)
/// 14 sequence | 15 retry | 16..240 data area (first 4 bytes: INIT payload)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    buf: Vec<u8>,
    layout: FrameLayout,
    cursor: usize,
}

impl Frame {
    /// Allocate a zeroed frame carrying `message_type`.
    ///
    /// Size-prefixed frames get the prefix pre-filled with the frame size.
    pub fn new(message_type: u8, layout: FrameLayout) -> Self {
        let mut frame = Self {
            buf: vec![0; layout.capacity()],
            layout,
            cursor: 0,
        };
        if layout == FrameLayout::SizePrefixed {
            frame.set_size_prefix(FRAME_SIZE as u16);
        }
        frame.set_message_id(message_type);
        frame
    }

    /// Rebuild a frame from bytes captured on the wire.
    ///
    /// `bytes` includes the size prefix for [`FrameLayout::SizePrefixed`].
    pub fn from_wire(bytes: &[u8], layout: FrameLayout) -> Result<Self> {
        if bytes.len() > layout.capacity() {
            return Err(FrameError::CapacityExceeded {
                requested: bytes.len(),
                available: layout.capacity(),
            });
        }
        let mut frame = Self {
            buf: vec![0; layout.capacity()],
            layout,
            cursor: 0,
        };
        frame.buf[..bytes.len()].copy_from_slice(bytes);
        Ok(frame)
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Whole buffer, prefix included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Buffer without the size prefix.
    pub fn body(&self) -> &[u8] {
        &self.buf[self.layout.header_offset()..]
    }

    /// Replace the body with bytes received from a peer and zero the remainder.
    pub fn load_body(&mut self, data: &[u8]) -> Result<usize> {
        if data.len() > FRAME_SIZE {
            return Err(FrameError::CapacityExceeded {
                requested: data.len(),
                available: FRAME_SIZE,
            });
        }
        let start = self.layout.header_offset();
        self.buf[start..start + data.len()].copy_from_slice(data);
        self.buf[start + data.len()..].fill(0);
        self.cursor = 0;
        Ok(data.len())
    }

    /// Size prefix value, `None` for plain frames.
    pub fn size_prefix(&self) -> Option<u16> {
        match self.layout {
            FrameLayout::Plain => None,
            FrameLayout::SizePrefixed => Some(u16::from_be_bytes([self.buf[0], self.buf[1]])),
        }
    }

    /// Overwrite the size prefix. Ignored by plain frames.
    pub fn set_size_prefix(&mut self, size: u16) {
        if self.layout == FrameLayout::SizePrefixed {
            self.buf[..SIZE_PREFIX_LEN].copy_from_slice(&size.to_be_bytes());
        }
    }

    fn at(&self, field: usize) -> usize {
        self.layout.header_offset() + field
    }

    fn data_start(&self) -> usize {
        self.at(HEADER_SIZE)
    }

    fn read_u16(&self, field: usize) -> u16 {
        let i = self.at(field);
        u16::from_be_bytes([self.buf[i], self.buf[i + 1]])
    }

    fn write_u16(&mut self, field: usize, value: u16) {
        let i = self.at(field);
        self.buf[i..i + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn set_message_id(&mut self, message_type: u8) {
        let i = self.at(MESSAGE_TYPE);
        self.buf[i] = message_type;
    }

    pub fn message_id(&self) -> u8 {
        self.buf[self.at(MESSAGE_TYPE)]
    }

    pub fn set_data_type(&mut self, data_type: u8) {
        let i = self.at(DATA_TYPE);
        self.buf[i] = data_type;
    }

    pub fn data_type(&self) -> u8 {
        self.buf[self.at(DATA_TYPE)]
    }

    pub fn set_data_start_number(&mut self, value: u16) {
        self.write_u16(DATA_START_NUMBER, value);
    }

    pub fn data_start_number(&self) -> u16 {
        self.read_u16(DATA_START_NUMBER)
    }

    pub fn set_data_offset(&mut self, value: u16) {
        self.write_u16(DATA_OFFSET, value);
    }

    pub fn data_offset(&self) -> u16 {
        self.read_u16(DATA_OFFSET)
    }

    /// Write the correlation id into the header.
    ///
    /// Use [`SequenceRegistry::assign`](crate::SequenceRegistry::assign) to
    /// also track it for acknowledgement.
    pub fn assign_sequence_number(&mut self, id: u8) {
        let i = self.at(SEQUENCE_NUMBER);
        self.buf[i] = id;
    }

    pub fn sequence_number(&self) -> u8 {
        self.buf[self.at(SEQUENCE_NUMBER)]
    }

    pub fn set_retry_count(&mut self, retries: u8) {
        let i = self.at(RETRY_COUNT);
        self.buf[i] = retries;
    }

    pub fn retry_count(&self) -> u8 {
        self.buf[self.at(RETRY_COUNT)]
    }

    /// Fill the INIT payload: seven big-endian counters followed by one byte per slave.
    pub fn set_config(&mut self, config: &PlcConfig) -> Result<()> {
        if config.slave_addresses.len() > MAX_SLAVES {
            return Err(FrameError::CapacityExceeded {
                requested: config.slave_addresses.len(),
                available: MAX_SLAVES,
            });
        }

        let counters = [
            config.bool_read_length,
            config.analog_read_length,
            config.bool_inputs,
            config.analog_inputs,
            config.bool_commands,
            config.analog_commands,
            config.slave_addresses.len() as u16,
        ];
        for (i, counter) in counters.iter().enumerate() {
            self.write_u16(HEADER_SIZE + 2 * i, *counter);
        }

        let start = self.data_start() + CONFIG_SLAVES;
        self.buf[start..start + config.slave_addresses.len()]
            .copy_from_slice(&config.slave_addresses);
        Ok(())
    }

    /// Append `length` bytes of `source[start..]` at the append cursor.
    ///
    /// Fails without writing anything if the data area would overflow.
    pub fn append_bytes(&mut self, source: &[u8], start: usize, length: usize) -> Result<()> {
        let available = DATA_AREA_SIZE - self.cursor;
        if length > available {
            return Err(FrameError::CapacityExceeded {
                requested: length,
                available,
            });
        }
        let end = start
            .checked_add(length)
            .filter(|end| *end <= source.len())
            .ok_or(FrameError::IndexOutOfRange {
                index: start.saturating_add(length),
                min: 0,
                max: source.len(),
            })?;

        let dst = self.data_start() + self.cursor;
        self.buf[dst..dst + length].copy_from_slice(&source[start..end]);
        self.cursor += length;
        Ok(())
    }

    /// Bytes appended since the last cursor reset.
    pub fn appended_len(&self) -> usize {
        self.cursor
    }

    /// Rewind the append cursor. Transports call this after every transmit.
    pub fn reset_append_cursor(&mut self) {
        self.cursor = 0;
    }

    fn word_position(&self, index: usize) -> Result<usize> {
        if !(1..=MAX_WORD_INDEX).contains(&index) {
            return Err(FrameError::IndexOutOfRange {
                index,
                min: 1,
                max: MAX_WORD_INDEX,
            });
        }
        Ok(self.data_start() + 2 * (index - 1))
    }

    fn dword_position(&self, index: usize) -> Result<usize> {
        if !(1..=MAX_DWORD_INDEX).contains(&index) {
            return Err(FrameError::IndexOutOfRange {
                index,
                min: 1,
                max: MAX_DWORD_INDEX,
            });
        }
        Ok(self.data_start() + 4 * (index - 1))
    }

    /// Overwrite the 1-based data word `index`.
    pub fn set_word(&mut self, index: usize, value: u16) -> Result<()> {
        let i = self.word_position(index)?;
        self.buf[i..i + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Read the 1-based data word `index`.
    pub fn word(&self, index: usize) -> Result<u16> {
        let i = self.word_position(index)?;
        Ok(u16::from_be_bytes([self.buf[i], self.buf[i + 1]]))
    }

    /// Overwrite the 1-based data dword `index`.
    pub fn set_dword(&mut self, index: usize, value: u32) -> Result<()> {
        let i = self.dword_position(index)?;
        self.buf[i..i + 4].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    /// Read the 1-based data dword `index`.
    pub fn dword(&self, index: usize) -> Result<u32> {
        let i = self.dword_position(index)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[i..i + 4]);
        Ok(u32::from_be_bytes(raw))
    }

    /// Leading slice of the data area holding `size_words + 1` words.
    pub fn bytes(&self, size_words: usize) -> Result<&[u8]> {
        if size_words > MAX_WORD_INDEX {
            return Err(FrameError::IndexOutOfRange {
                index: size_words,
                min: 0,
                max: MAX_WORD_INDEX,
            });
        }
        let start = self.data_start();
        Ok(&self.buf[start..start + 2 * size_words + 2])
    }

    /// Read the data-area byte at `offset`.
    pub fn byte(&self, offset: usize) -> Result<u8> {
        if offset >= DATA_AREA_SIZE {
            return Err(FrameError::IndexOutOfRange {
                index: offset,
                min: 0,
                max: DATA_AREA_SIZE - 1,
            });
        }
        Ok(self.buf[self.data_start() + offset])
    }

    /// Whole data area.
    pub fn data(&self) -> &[u8] {
        let start = self.data_start();
        &self.buf[start..start + DATA_AREA_SIZE]
    }

    /// Text payload up to the end-of-text marker.
    pub fn text(&self) -> Result<String> {
        let data = self.data();
        let end = data
            .iter()
            .position(|b| *b == END_OF_TEXT)
            .ok_or(FrameError::MissingTerminator)?;
        Ok(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    pub fn set_handler_alive_period(&mut self, period_ms: u32) {
        let i = self.data_start();
        self.buf[i..i + 4].copy_from_slice(&period_ms.to_be_bytes());
    }

    pub fn handler_alive_period(&self) -> u32 {
        (u32::from(self.read_u16(HEADER_SIZE)) << 16) | u32::from(self.read_u16(HEADER_SIZE + 2))
    }

    pub fn set_supervision_alive_period(&mut self, period_ms: u32) {
        let i = self.data_start() + 4;
        self.buf[i..i + 4].copy_from_slice(&period_ms.to_be_bytes());
    }

    pub fn supervision_alive_period(&self) -> u32 {
        (u32::from(self.read_u16(HEADER_SIZE + 4)) << 16)
            | u32::from(self.read_u16(HEADER_SIZE + 6))
    }

    pub fn set_sync_type(&mut self, sync: SyncType) {
        let i = self.data_start() + SYNC_TYPE;
        self.buf[i] = sync as u8;
    }

    pub fn timestamp_fields(&self) -> TimestampFields {
        let start = self.layout.header_offset();
        let mut raw = [0u8; TimestampFields::SIZE];
        raw.copy_from_slice(&self.buf[start..start + TimestampFields::SIZE]);
        TimestampFields::from_bytes(raw)
    }

    pub fn set_timestamp_fields(&mut self, fields: TimestampFields) {
        let start = self.layout.header_offset();
        self.buf[start..start + TimestampFields::SIZE].copy_from_slice(&fields.to_bytes());
    }

    /// Stamp the header with a local instant.
    pub fn set_timestamp(&mut self, instant: &DateTime<Local>) {
        self.set_timestamp_fields(encode_timestamp(instant));
    }

    /// Decode the header date/time into a local instant.
    pub fn timestamp(&self) -> Result<DateTime<Local>> {
        decode_timestamp(&self.timestamp_fields())
    }

    /// Decode the header date/time as milliseconds since the Unix epoch.
    pub fn extract_timestamp_millis(&self) -> Result<i64> {
        let millis = self.timestamp()?.timestamp_millis();
        debug!(millis, "timestamp extracted from frame");
        Ok(millis)
    }

    /// Stamp the header with "now + 1s" and block until the wall clock reaches it.
    ///
    /// The capture is repeated when the target instant falls on another day
    /// than the capture moment. This runs on the calling thread and is meant to
    /// be followed immediately by the send, so the PLC receives the message at
    /// the stamped second boundary.
    pub fn set_synchronized_clock(&mut self) {
        self.synchronize_with(Local::now);
    }

    pub(crate) fn synchronize_with<F>(&mut self, mut now: F)
    where
        F: FnMut() -> DateTime<Local>,
    {
        loop {
            let captured = now();
            let target = captured + chrono::Duration::milliseconds(SYNC_LEAD_MS);
            info!(target = %target, "aligning frame clock");
            self.set_timestamp(&target);

            loop {
                let current = now();
                if current >= target {
                    break;
                }
                let remaining = (target - current).to_std().unwrap_or_default();
                thread::sleep(remaining.min(SYNC_POLL_INTERVAL));
            }

            if captured.date_naive() == target.date_naive() {
                return;
            }
            debug!("day rolled over during clock alignment, capturing again");
        }
    }

    /// First 25 bytes as a hex dump, for debug logging.
    pub fn header_dump(&self) -> String {
        to_hex_string(&self.buf[..25.min(self.buf.len())])
    }
}
