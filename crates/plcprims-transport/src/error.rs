use std::time::Duration;

use plcprims_frame::{FrameError, FrameLayout};

/// Errors that can occur while talking to a PLC.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Name resolution or TCP connect failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// The peer answered the connection request with something other than a confirm.
    #[error("connection handshake rejected: {0}")]
    HandshakeRejected(String),

    /// An I/O error occurred on an established connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete message arrived before the read timeout.
    #[error("receive timed out after {0:?}")]
    Timeout(Duration),

    /// Too many fragments arrived without the last-fragment marker.
    #[error("no last fragment after {fragments} packets")]
    ReassemblyExhausted { fragments: usize },

    /// The reassembled payload does not fit the destination buffer.
    #[error("reassembled payload too large ({size} bytes, max {max})")]
    ReassemblyOverflow { size: usize, max: usize },

    /// The peer sent a disconnect request.
    #[error("peer requested disconnect")]
    PeerDisconnected,

    /// The peer closed the TCP connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The driver has no live connection.
    #[error("not connected")]
    NotConnected,

    /// A TSAP identifier is longer than the protocol allows.
    #[error("{which} TSAP too long ({len} bytes, max {max})")]
    InvalidTsap {
        which: &'static str,
        len: usize,
        max: usize,
    },

    /// A packet violates the ISO-on-TCP framing rules.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Connection parameters or tuning values are unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The frame layout does not match what this transport puts on the wire.
    #[error("transport expects {expected:?} frames")]
    WrongLayout { expected: FrameLayout },

    /// Frame encoding or decoding failed.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl TransportError {
    /// Whether the connection can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::Io(_)
                | TransportError::ReassemblyExhausted { .. }
                | TransportError::ReassemblyOverflow { .. }
                | TransportError::PeerDisconnected
                | TransportError::ConnectionClosed
                | TransportError::InvalidPacket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
