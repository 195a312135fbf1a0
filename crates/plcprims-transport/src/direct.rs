use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use plcprims_frame::{Frame, FrameLayout, SequenceRegistry, FRAME_SIZE, SIZE_PREFIX_LEN};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::link::{self, Link};
use crate::params::ConnectionParameters;
use crate::traits::{ConnectionState, PlcDriver};

/// Tuning for [`DirectFramingTransport`].
#[derive(Debug, Clone)]
pub struct DirectConfig {
    /// Limit for each TCP connect attempt; `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Plain TCP transport: each frame travels as its 2-byte size prefix plus body.
#[derive(Debug)]
pub struct DirectFramingTransport {
    config: DirectConfig,
    link: Link,
    sequences: Arc<SequenceRegistry>,
}

impl DirectFramingTransport {
    pub fn new() -> Self {
        Self::with_config(DirectConfig::default())
    }

    pub fn with_config(config: DirectConfig) -> Self {
        Self {
            config,
            link: Link::new(),
            sequences: Arc::new(SequenceRegistry::new()),
        }
    }

    /// Wait for one client on `listener` and return a driver connected to it.
    pub fn accept(listener: &TcpListener, config: DirectConfig) -> Result<Self> {
        let (stream, _) = listener.accept()?;
        Self::from_accepted(stream, config)
    }

    /// Wrap a socket accepted elsewhere.
    pub fn from_accepted(stream: TcpStream, config: DirectConfig) -> Result<Self> {
        if let Ok(peer) = stream.peer_addr() {
            info!(%peer, "accepted direct framing connection");
        }
        let driver = Self::with_config(config);
        driver.link.install(stream)?;
        Ok(driver)
    }

    pub fn config(&self) -> &DirectConfig {
        &self.config
    }
}

impl Default for DirectFramingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PlcDriver for DirectFramingTransport {
    fn connect(&self, params: &ConnectionParameters) -> Result<()> {
        if self.link.state() != ConnectionState::Disconnected {
            debug!("dropping previous connection before reconnecting");
            self.link.close();
        }
        self.link.set_state(ConnectionState::Connecting);
        info!(addr = %params.address(), "connecting");

        let stream = match Link::open(params, self.config.connect_timeout) {
            Ok(stream) => stream,
            Err(e) => {
                self.link.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.link.install(stream)?;
        info!(addr = %params.address(), "connected");
        Ok(())
    }

    fn disconnect(&self, params: &ConnectionParameters) -> Result<()> {
        self.link.set_state(ConnectionState::Disconnecting);
        self.link.close();
        info!(addr = %params.address(), "disconnected");
        Ok(())
    }

    fn send(&self, frame: &mut Frame) -> Result<()> {
        if frame.layout() != FrameLayout::SizePrefixed {
            return Err(TransportError::WrongLayout {
                expected: FrameLayout::SizePrefixed,
            });
        }
        self.link.with_writer(|stream| {
            stream.write_all(frame.as_bytes())?;
            stream.flush()?;
            Ok(())
        })?;
        debug!(
            bytes = frame.as_bytes().len(),
            header = %frame.header_dump(),
            "frame sent"
        );
        frame.reset_append_cursor();
        Ok(())
    }

    /// Reads the size prefix, then one read of at most `min(prefix, 240)` bytes.
    ///
    /// A short body is returned as-is; the byte count tells the caller how
    /// much of the frame is fresh.
    fn receive(&self, frame: &mut Frame, timeout: Option<Duration>) -> Result<usize> {
        if frame.layout() != FrameLayout::SizePrefixed {
            return Err(TransportError::WrongLayout {
                expected: FrameLayout::SizePrefixed,
            });
        }
        let (size, body) = self.link.with_reader(|stream| {
            link::set_read_timeout(stream, timeout)?;

            let mut prefix = [0u8; SIZE_PREFIX_LEN];
            link::read_message_start(stream, &mut prefix, timeout)?;
            let size = u16::from_be_bytes(prefix);

            let want = usize::from(size).min(FRAME_SIZE);
            let mut body = vec![0u8; want];
            let n = if want == 0 {
                0
            } else {
                loop {
                    match stream.read(&mut body) {
                        Ok(0) => return Err(TransportError::ConnectionClosed),
                        Ok(n) => break n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                        Err(e) => return Err(TransportError::Io(e)),
                    }
                }
            };
            body.truncate(n);
            Ok((size, body))
        })?;

        frame.set_size_prefix(size);
        let n = frame.load_body(&body)?;
        debug!(size, bytes = n, header = %frame.header_dump(), "frame received");
        Ok(n)
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    fn sequences(&self) -> &Arc<SequenceRegistry> {
        &self.sequences
    }

    fn frame_layout(&self) -> FrameLayout {
        FrameLayout::SizePrefixed
    }

    fn transport_name(&self) -> &'static str {
        "direct-framing"
    }
}
