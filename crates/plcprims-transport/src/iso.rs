use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use plcprims_frame::{to_hex_string, Frame, FrameLayout, SequenceRegistry, FRAME_SIZE};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::link::{self, Link};
use crate::params::ConnectionParameters;
use crate::tpdu::{self, CommandPacket, PacketHeader};
use crate::traits::{ConnectionState, PlcDriver};

/// Tuning for [`SegmentedTransport`].
#[derive(Debug, Clone)]
pub struct SegmentedConfig {
    /// Largest ISO-on-TCP packet, headers included. Each fragment carries at
    /// most `max_packet_size - 11` payload bytes.
    pub max_packet_size: usize,
    /// Limit for each TCP connect attempt; `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// How long to wait for the connection confirm.
    pub handshake_timeout: Duration,
    /// Extra packets read per message before giving up on the last-fragment marker.
    pub receive_retries: usize,
}

impl Default for SegmentedConfig {
    fn default() -> Self {
        Self {
            max_packet_size: tpdu::MAX_PACKET_SIZE,
            connect_timeout: Some(Duration::from_secs(10)),
            handshake_timeout: Duration::from_secs(10),
            receive_retries: 5,
        }
    }
}

impl SegmentedConfig {
    pub fn validate(&self) -> Result<()> {
        if !(tpdu::MIN_PACKET_SIZE..=tpdu::MAX_PACKET_SIZE).contains(&self.max_packet_size) {
            return Err(TransportError::InvalidConfig(format!(
                "max packet size {} outside {}..={}",
                self.max_packet_size,
                tpdu::MIN_PACKET_SIZE,
                tpdu::MAX_PACKET_SIZE
            )));
        }
        if self.handshake_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "handshake timeout must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Payload bytes per fragment.
    pub fn max_payload(&self) -> usize {
        tpdu::max_fragment_payload(self.max_packet_size)
    }
}

/// ISO-on-TCP (RFC 1006) transport with CR/CC handshake and fragmentation.
#[derive(Debug)]
pub struct SegmentedTransport {
    config: SegmentedConfig,
    link: Link,
    sequences: Arc<SequenceRegistry>,
}

impl SegmentedTransport {
    pub fn new() -> Self {
        Self {
            config: SegmentedConfig::default(),
            link: Link::new(),
            sequences: Arc::new(SequenceRegistry::new()),
        }
    }

    pub fn with_config(config: SegmentedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            link: Link::new(),
            sequences: Arc::new(SequenceRegistry::new()),
        })
    }

    pub fn config(&self) -> &SegmentedConfig {
        &self.config
    }

    /// Wait for one client on `listener`, confirm its connection request and
    /// return a driver connected to it.
    pub fn accept(listener: &TcpListener, config: SegmentedConfig) -> Result<Self> {
        config.validate()?;
        let (stream, _) = listener.accept()?;
        Self::from_accepted(stream, config)
    }

    /// Answer the connection request on a socket accepted elsewhere.
    pub fn from_accepted(mut stream: TcpStream, config: SegmentedConfig) -> Result<Self> {
        let driver = Self::with_config(config)?;
        link::enable_keepalive(&stream);
        stream.set_read_timeout(Some(driver.config.handshake_timeout))?;

        let request = read_packet(&mut stream, true, Some(driver.config.handshake_timeout))?;
        let command = CommandPacket::parse(&request)?;
        if command.code != tpdu::CR {
            return Err(TransportError::HandshakeRejected(format!(
                "expected connection request, got code 0x{:02x}",
                command.code
            )));
        }

        let mut confirm = request;
        confirm[5] = tpdu::CC;
        stream.write_all(&confirm)?;
        stream.set_read_timeout(None)?;
        info!(
            peer = ?stream.peer_addr().ok(),
            source_tsap = %command.source_tsap,
            destination_tsap = %command.destination_tsap,
            "accepted ISO-on-TCP connection"
        );

        driver.link.install(stream)?;
        Ok(driver)
    }

    fn handshake(&self, params: &ConnectionParameters) -> Result<TcpStream> {
        let request = tpdu::encode_command(tpdu::CR, params)?;
        let mut stream = Link::open(params, self.config.connect_timeout)?;
        let connect_err = |source| TransportError::Connect {
            addr: params.address(),
            source,
        };
        link::enable_keepalive(&stream);
        stream
            .set_read_timeout(Some(self.config.handshake_timeout))
            .map_err(connect_err)?;

        exchange_confirm(&mut stream, &request, &params.address())?;

        stream.set_read_timeout(None).map_err(connect_err)?;
        Ok(stream)
    }

    /// Send an arbitrary payload, fragmenting it as needed. Returns the fragment count.
    pub fn send_payload(&self, payload: &[u8]) -> Result<usize> {
        let max = self.config.max_payload();
        let lengths = tpdu::fragment_lengths(payload.len(), max);

        let count = self.link.with_writer(|stream| {
            let mut packet = BytesMut::with_capacity(tpdu::DATA_HEADER_LEN + max.min(payload.len()));
            let mut offset = 0;
            for (i, len) in lengths.iter().enumerate() {
                let last = i + 1 == lengths.len();
                packet.clear();
                tpdu::encode_data_header(*len, last, &mut packet)?;
                packet.extend_from_slice(&payload[offset..offset + len]);
                stream.write_all(&packet)?;
                offset += len;
            }
            stream.flush()?;
            Ok(lengths.len())
        })?;

        debug!(bytes = payload.len(), fragments = count, "payload sent");
        Ok(count)
    }

    /// Reassemble one payload into `buf` and return its length.
    ///
    /// A disconnect request from the peer, a payload larger than `buf` and a
    /// missing last-fragment marker all fail the whole receive.
    pub fn receive_payload(&self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        let max_packets = self.config.receive_retries + 1;

        self.link.with_reader(|stream| {
            link::set_read_timeout(stream, timeout)?;

            let mut offset = 0;
            for fragment in 0..max_packets {
                let packet = read_packet(stream, fragment == 0, timeout)?;
                let header = PacketHeader::parse(&packet)?;
                match header.code {
                    tpdu::DT => {}
                    tpdu::DR => return Err(TransportError::PeerDisconnected),
                    other => {
                        return Err(TransportError::InvalidPacket(format!(
                            "unexpected code 0x{other:02x} while receiving data"
                        )))
                    }
                }

                let payload = &packet[tpdu::DATA_HEADER_LEN..];
                let end = offset + payload.len();
                if end > buf.len() {
                    return Err(TransportError::ReassemblyOverflow {
                        size: end,
                        max: buf.len(),
                    });
                }
                buf[offset..end].copy_from_slice(payload);
                offset = end;
                debug!(fragment, bytes = payload.len(), last = header.is_last(), "fragment received");

                if header.is_last() {
                    return Ok(offset);
                }
            }
            Err(TransportError::ReassemblyExhausted {
                fragments: max_packets,
            })
        })
    }
}

impl Default for SegmentedTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one packet by its TPKT length.
fn read_packet(stream: &mut TcpStream, first: bool, timeout: Option<Duration>) -> Result<Vec<u8>> {
    let mut tpkt = [0u8; tpdu::TPKT_HEADER_LEN];
    if first {
        link::read_message_start(stream, &mut tpkt, timeout)?;
    } else {
        link::read_rest(stream, &mut tpkt)?;
    }
    let length = tpdu::packet_length(&tpkt)?;

    let mut packet = vec![0u8; length];
    packet[..tpdu::TPKT_HEADER_LEN].copy_from_slice(&tpkt);
    link::read_rest(stream, &mut packet[tpdu::TPKT_HEADER_LEN..])?;
    Ok(packet)
}

/// Send the connection request and accept only a confirm of exactly the same size.
fn exchange_confirm<S: Read + Write>(stream: &mut S, request: &[u8], addr: &str) -> Result<()> {
    debug!(frame = %to_hex_string(request), "sending connection request");
    stream
        .write_all(request)
        .and_then(|()| stream.flush())
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    let mut reply = vec![0u8; request.len()];
    link::read_rest(stream, &mut reply).map_err(|e| {
        TransportError::HandshakeRejected(format!(
            "no complete {}-byte confirm: {e}",
            request.len()
        ))
    })?;
    debug!(frame = %to_hex_string(&reply), "connection confirm received");

    let announced = usize::from(u16::from_be_bytes([reply[2], reply[3]]));
    if announced != request.len() {
        return Err(TransportError::HandshakeRejected(format!(
            "confirm announces {announced} bytes, request had {}",
            request.len()
        )));
    }
    if reply[5] != tpdu::CC {
        return Err(TransportError::HandshakeRejected(format!(
            "expected confirm code 0x{:02x}, got 0x{:02x}",
            tpdu::CC,
            reply[5]
        )));
    }
    Ok(())
}

impl PlcDriver for SegmentedTransport {
    fn connect(&self, params: &ConnectionParameters) -> Result<()> {
        if self.link.state() != ConnectionState::Disconnected {
            debug!("dropping previous connection before reconnecting");
            self.link.close();
        }
        self.link.set_state(ConnectionState::Connecting);
        info!(addr = %params.address(), "connecting");

        // On failure the stream is dropped here, which closes the socket.
        let stream = match self.handshake(params) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(addr = %params.address(), error = %e, "connect failed");
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

        let mut outcome = Ok(());
        if params.shutdown {
            match tpdu::encode_command(tpdu::DR, params) {
                Ok(request) => {
                    debug!(frame = %to_hex_string(&request), "sending disconnect request");
                    let sent = self.link.with_writer(|stream| {
                        stream.write_all(&request)?;
                        Ok(())
                    });
                    if let Err(e) = sent {
                        warn!(error = %e, "failed to send disconnect request");
                    }
                }
                Err(e) => outcome = Err(e),
            }
        }

        self.link.close();
        info!(addr = %params.address(), "disconnected");
        outcome
    }

    fn send(&self, frame: &mut Frame) -> Result<()> {
        if frame.layout() != FrameLayout::Plain {
            return Err(TransportError::WrongLayout {
                expected: FrameLayout::Plain,
            });
        }
        self.send_payload(frame.as_bytes())?;
        debug!(header = %frame.header_dump(), "frame sent");
        frame.reset_append_cursor();
        Ok(())
    }

    fn receive(&self, frame: &mut Frame, timeout: Option<Duration>) -> Result<usize> {
        if frame.layout() != FrameLayout::Plain {
            return Err(TransportError::WrongLayout {
                expected: FrameLayout::Plain,
            });
        }
        let mut buf = [0u8; FRAME_SIZE];
        let n = self.receive_payload(&mut buf, timeout)?;
        frame.load_body(&buf[..n])?;
        debug!(bytes = n, header = %frame.header_dump(), "frame received");
        Ok(n)
    }

    fn state(&self) -> ConnectionState {
        self.link.state()
    }

    fn sequences(&self) -> &Arc<SequenceRegistry> {
        &self.sequences
    }

    fn frame_layout(&self) -> FrameLayout {
        FrameLayout::Plain
    }

    fn transport_name(&self) -> &'static str {
        "iso-on-tcp"
    }
}
