use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use plcprims_frame::{Frame, FrameLayout, SequenceRegistry};

use crate::error::Result;
use crate::params::ConnectionParameters;

/// Lifecycle of a driver's single TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// A transport that moves [`Frame`]s to and from one PLC.
///
/// One sender thread and one receiver thread may use a driver at the same
/// time through an `Arc`. Concurrent senders (or receivers) are serialized.
pub trait PlcDriver: Send + Sync {
    /// Open the connection. Never retries.
    fn connect(&self, params: &ConnectionParameters) -> Result<()>;

    /// Close the connection. Secondary errors while closing are logged, not returned.
    fn disconnect(&self, params: &ConnectionParameters) -> Result<()>;

    /// Transmit `frame` and rewind its append cursor.
    fn send(&self, frame: &mut Frame) -> Result<()>;

    /// Read one message into `frame` and return the number of payload bytes.
    ///
    /// `None` or a zero duration blocks until data arrives or the connection closes.
    fn receive(&self, frame: &mut Frame, timeout: Option<Duration>) -> Result<usize>;

    fn state(&self) -> ConnectionState;

    /// Sequence numbers awaiting acknowledgement on this connection.
    fn sequences(&self) -> &Arc<SequenceRegistry>;

    /// Layout of the frames this transport sends and receives.
    fn frame_layout(&self) -> FrameLayout;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;

    /// Allocate a frame with the layout this transport expects.
    fn new_frame(&self, message_type: u8) -> Frame {
        Frame::new(message_type, self.frame_layout())
    }
}
