use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use plcprims_frame::message;
use plcprims_transport::{
    DirectConfig, DirectFramingTransport, PlcDriver, SegmentedTransport, TransportError,
};
use tracing::info;

use crate::cmd::{iso_config, Family, ListenArgs};
use crate::exit::{io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpListener::bind(&args.addr).map_err(|err| io_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| io_error("bind failed", err))?;
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, family = ?args.family, "listening");
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let Some((stream, peer)) = wait_for_client(&listener, &running)? else {
        return Ok(SUCCESS);
    };
    let driver = accept_driver(stream, &args)?;
    let peer = peer.to_string();

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let mut frame = driver.new_frame(0);
        match driver.receive(&mut frame, Some(POLL_INTERVAL)) {
            Ok(_) => {}
            Err(TransportError::Timeout(_)) => continue,
            Err(TransportError::PeerDisconnected | TransportError::ConnectionClosed) => {
                info!(%peer, "peer disconnected");
                break;
            }
            Err(err) => return Err(transport_error("receive failed", err)),
        }

        print_frame(&frame, &peer, format);

        if args.ack {
            let mut ack = driver.new_frame(message::ACK);
            ack.assign_sequence_number(frame.sequence_number());
            ack.set_timestamp(&chrono::Local::now());
            driver
                .send(&mut ack)
                .map_err(|err| transport_error("ack failed", err))?;
        }

        printed = printed.saturating_add(1);
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
    }

    Ok(SUCCESS)
}

fn wait_for_client(
    listener: &TcpListener,
    running: &AtomicBool,
) -> CliResult<Option<(TcpStream, std::net::SocketAddr)>> {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                stream
                    .set_nonblocking(false)
                    .map_err(|err| io_error("accept failed", err))?;
                return Ok(Some((stream, peer)));
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(POLL_INTERVAL),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) => return Err(io_error("accept failed", err)),
        }
    }
    Ok(None)
}

fn accept_driver(stream: TcpStream, args: &ListenArgs) -> CliResult<Box<dyn PlcDriver>> {
    let driver: Box<dyn PlcDriver> = match args.family {
        Family::Direct => Box::new(
            DirectFramingTransport::from_accepted(stream, DirectConfig::default())
                .map_err(|err| transport_error("accept failed", err))?,
        ),
        Family::Iso => Box::new(
            SegmentedTransport::from_accepted(stream, iso_config(args.max_packet_size))
                .map_err(|err| transport_error("handshake failed", err))?,
        ),
    };
    Ok(driver)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
