//! Minimal ISO-on-TCP PLC stand-in that accepts one client and acknowledges every frame.
//!
//! Run with:
//!   cargo run --example plc-echo
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1 --port 1102 \
//!     --src-tsap TCP-SRC1 --dst-tsap TCP-DST1 --msg-type BOOL_DATA --wait

use std::net::TcpListener;

use plcprims::frame::{format_frame_timestamp, message};
use plcprims::transport::{PlcDriver, SegmentedConfig, SegmentedTransport, TransportError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:1102")?;
    eprintln!("Listening on {}", listener.local_addr()?);

    let driver = SegmentedTransport::accept(&listener, SegmentedConfig::default())?;
    eprintln!("Client connected");

    loop {
        let mut frame = driver.new_frame(0);
        match driver.receive(&mut frame, None) {
            Ok(n) => {
                eprintln!(
                    "Received {} ({n} bytes, seq {}) stamped {}",
                    message::message_name(frame.message_id()),
                    frame.sequence_number(),
                    format_frame_timestamp(&frame)
                );
                let mut ack = driver.new_frame(message::ACK);
                ack.assign_sequence_number(frame.sequence_number());
                driver.send(&mut ack)?;
            }
            Err(TransportError::PeerDisconnected | TransportError::ConnectionClosed) => {
                eprintln!("Client disconnected");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
