//! PLC frame codec and blocking TCP transports.
//!
//! # Crate Structure
//!
//! - [`frame`] - Fixed-layout 240-byte frames, packed-BCD timestamps, sequence tracking
//! - [`transport`] - The [`PlcDriver`](transport::PlcDriver) trait with direct-framing
//!   and ISO-on-TCP implementations

/// Re-export frame types.
pub mod frame {
    pub use plcprims_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use plcprims_transport::*;
}
