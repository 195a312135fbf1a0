//! Fixed-layout PLC message frames.
//!
//! Every message exchanged with the PLC is a 240-byte buffer:
//! - An 8-byte packed-BCD timestamp (year .. milliseconds + weekday)
//! - Message type, data type, data-start number and data offset
//! - A sequence number and retry counter for acknowledgement tracking
//! - A 224-byte data area addressable by byte, word or dword
//!
//! Some PLC families expect an extra 2-byte big-endian size prefix in front.

pub mod bcd;
pub mod error;
pub mod frame;
pub mod message;
pub mod sequence;

pub use bcd::{
    decode_timestamp, encode_timestamp, format_frame_timestamp, int_to_packed_bcd,
    packed_bcd_to_int, string_to_packed_bcd, to_hex_string, TimestampFields,
};
pub use error::{FrameError, Result};
pub use frame::{
    Frame, FrameLayout, PlcConfig, SyncType, DATA_AREA_SIZE, END_OF_TEXT, FRAME_SIZE,
    HEADER_SIZE, MAX_DWORD_INDEX, MAX_WORD_INDEX, SIZE_PREFIX_LEN,
};
pub use sequence::{SequenceRegistry, MESSAGE_TIMEOUT};
