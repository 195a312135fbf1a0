//! ISO-on-TCP (RFC 1006) packet encoding.
//!
//! Every packet starts with a 4-byte TPKT header followed by a COTP header:
//!
//! ```text
//! ┌─────────┬──────────┬─────────────┬────────┬──────┬───────────┐
//! │ version │ reserved │ length (BE) │ hdrlen │ code │ ...       │
//! │ 0x03    │ 0x00     │ 2 bytes     │ 1 byte │      │           │
//! └─────────┴──────────┴─────────────┴────────┴──────┴───────────┘
//! ```
//!
//! Data packets carry a 7-byte header (code DT, continuation byte) before
//! the payload. Connection packets carry two TSAP parameters.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TransportError};
use crate::params::ConnectionParameters;

pub const TPKT_VERSION: u8 = 0x03;
pub const TPKT_HEADER_LEN: usize = 4;
pub const DATA_HEADER_LEN: usize = 7;

/// Connection packet size without the two TSAP strings.
pub const COMMAND_FIXED_LEN: usize = 18;
pub const MAX_TSAP_LEN: usize = 8;

pub const MAX_PACKET_SIZE: usize = u16::MAX as usize;
/// Smallest packet size that still carries one payload byte per fragment.
pub const MIN_PACKET_SIZE: usize = TPKT_HEADER_LEN + DATA_HEADER_LEN + 1;

/// Connection request.
pub const CR: u8 = 0xE0;
/// Connection confirm.
pub const CC: u8 = 0xD0;
/// Disconnect request.
pub const DR: u8 = 0x80;
/// Data transfer.
pub const DT: u8 = 0xF0;

/// Continuation byte of every fragment but the last.
pub const INTERMEDIATE: u8 = 0x00;
/// Continuation byte of the final fragment (end of TSDU).
pub const LAST: u8 = 0x80;

const CODE_OFFSET: usize = 5;
const CONTINUATION_OFFSET: usize = 6;
const DT_HEADER_INDICATOR: u8 = 0x02;
const CALLED_TSAP: u8 = 0xC1;
const CALLING_TSAP: u8 = 0xC2;

/// Build a connection-family packet (CR, CC or DR).
///
/// Total length is `18 + |destination TSAP| + |source TSAP|`, i.e. 34 bytes
/// when both TSAPs use the full 8 characters.
pub fn encode_command(code: u8, params: &ConnectionParameters) -> Result<BytesMut> {
    params.validate()?;
    let dst = params.destination_tsap.as_bytes();
    let src = params.source_tsap.as_bytes();
    let total = COMMAND_FIXED_LEN + dst.len() + src.len();

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u8(TPKT_VERSION);
    buf.put_u8(0x00);
    buf.put_u16(total as u16);
    buf.put_u8((total - 5) as u8);
    buf.put_u8(code);
    buf.put_u16(0x0000); // destination reference
    buf.put_u16(0x4431); // source reference
    buf.put_u8(0x00); // class 0
    buf.put_slice(&[0xC0, 0x01, 0x0A]); // TPDU size 1024
    buf.put_u8(CALLED_TSAP);
    buf.put_u8(dst.len() as u8);
    buf.put_slice(dst);
    buf.put_u8(CALLING_TSAP);
    buf.put_u8(src.len() as u8);
    buf.put_slice(src);
    Ok(buf)
}

/// TSAPs and code decoded from a connection-family packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPacket {
    pub code: u8,
    pub destination_tsap: String,
    pub source_tsap: String,
}

impl CommandPacket {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        let header = PacketHeader::parse(packet)?;
        if packet.len() < COMMAND_FIXED_LEN {
            return Err(TransportError::InvalidPacket(format!(
                "connection packet of {} bytes",
                packet.len()
            )));
        }

        let mut pos = COMMAND_FIXED_LEN - 4;
        let destination_tsap = read_tsap(packet, &mut pos, CALLED_TSAP)?;
        let source_tsap = read_tsap(packet, &mut pos, CALLING_TSAP)?;
        Ok(Self {
            code: header.code,
            destination_tsap,
            source_tsap,
        })
    }
}

fn read_tsap(packet: &[u8], pos: &mut usize, tag: u8) -> Result<String> {
    let malformed = || TransportError::InvalidPacket(format!("malformed TSAP parameter 0x{tag:02x}"));
    if packet.get(*pos) != Some(&tag) {
        return Err(malformed());
    }
    let len = usize::from(*packet.get(*pos + 1).ok_or_else(malformed)?);
    let start = *pos + 2;
    let value = packet.get(start..start + len).ok_or_else(malformed)?;
    *pos = start + len;
    Ok(String::from_utf8_lossy(value).into_owned())
}

/// Append the 7-byte data header for a fragment carrying `payload_len` bytes.
pub fn encode_data_header(payload_len: usize, last: bool, dst: &mut BytesMut) -> Result<()> {
    let total = TPKT_HEADER_LEN + 3 + payload_len;
    if total > MAX_PACKET_SIZE {
        return Err(TransportError::InvalidPacket(format!(
            "fragment of {payload_len} bytes exceeds the packet size limit"
        )));
    }
    dst.reserve(DATA_HEADER_LEN);
    dst.put_u8(TPKT_VERSION);
    dst.put_u8(0x00);
    dst.put_u16(total as u16);
    dst.put_u8(DT_HEADER_INDICATOR);
    dst.put_u8(DT);
    dst.put_u8(if last { LAST } else { INTERMEDIATE });
    Ok(())
}

/// Validate a TPKT header and return the full packet length it announces.
pub fn packet_length(tpkt: &[u8; TPKT_HEADER_LEN]) -> Result<usize> {
    if tpkt[0] != TPKT_VERSION {
        return Err(TransportError::InvalidPacket(format!(
            "unexpected TPKT version 0x{:02x}",
            tpkt[0]
        )));
    }
    let length = usize::from(u16::from_be_bytes([tpkt[2], tpkt[3]]));
    if length < DATA_HEADER_LEN {
        return Err(TransportError::InvalidPacket(format!(
            "packet length {length} shorter than the header"
        )));
    }
    Ok(length)
}

/// Fixed fields shared by every packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Total packet length from the TPKT header.
    pub length: usize,
    pub code: u8,
    /// Continuation byte; only meaningful for DT packets.
    pub continuation: u8,
}

impl PacketHeader {
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.len() < DATA_HEADER_LEN {
            return Err(TransportError::InvalidPacket(format!(
                "{} bytes is too short for a packet header",
                packet.len()
            )));
        }
        let mut tpkt = [0u8; TPKT_HEADER_LEN];
        tpkt.copy_from_slice(&packet[..TPKT_HEADER_LEN]);
        let length = packet_length(&tpkt)?;
        Ok(Self {
            length,
            code: packet[CODE_OFFSET],
            continuation: packet[CONTINUATION_OFFSET],
        })
    }

    pub fn is_last(&self) -> bool {
        self.continuation == LAST
    }

    /// Payload bytes behind the data header.
    pub fn payload_len(&self) -> usize {
        self.length.saturating_sub(DATA_HEADER_LEN)
    }
}

/// Largest payload one fragment can carry for a given packet size.
pub fn max_fragment_payload(max_packet_size: usize) -> usize {
    max_packet_size.saturating_sub(TPKT_HEADER_LEN + DATA_HEADER_LEN)
}

/// Split `total` payload bytes into fragment sizes of at most `max_payload`.
///
/// An empty payload still yields one (empty, last) fragment.
pub fn fragment_lengths(total: usize, max_payload: usize) -> Vec<usize> {
    if total == 0 || max_payload == 0 {
        return vec![total];
    }
    let mut lengths = vec![max_payload; total / max_payload];
    if total % max_payload != 0 {
        lengths.push(total % max_payload);
    }
    lengths
}
