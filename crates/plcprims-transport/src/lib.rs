//! Blocking TCP transports for PLC frames.
//!
//! Two wire families are supported behind the [`PlcDriver`] trait:
//! - [`DirectFramingTransport`]: the frame travels verbatim with a 2-byte size prefix
//! - [`SegmentedTransport`]: ISO-on-TCP (RFC 1006) with a CR/CC handshake,
//!   fragmentation on send and reassembly on receive
//!
//! Each driver owns one connection and may be shared by one sender thread
//! and one receiver thread.

pub mod direct;
pub mod error;
pub mod iso;
mod link;
pub mod params;
pub mod tpdu;
pub mod traits;

pub use direct::{DirectConfig, DirectFramingTransport};
pub use error::{Result, TransportError};
pub use iso::{SegmentedConfig, SegmentedTransport};
pub use params::ConnectionParameters;
pub use traits::{ConnectionState, PlcDriver};
