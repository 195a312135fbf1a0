//! Socket plumbing shared by both transports.
//!
//! A connection is held as three handles on the same socket: one for the
//! send path, one for the receive path and one kept aside so `disconnect`
//! can shut the socket down while a receiver is blocked in `read`.

use std::io::{self, Read};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use socket2::SockRef;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::params::ConnectionParameters;
use crate::traits::ConnectionState;

// A poisoned lock only means a thread panicked while holding it; the socket
// handle inside is still valid to use or drop.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub(crate) struct Link {
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<TcpStream>>,
    reader: Mutex<Option<TcpStream>>,
    control: Mutex<Option<TcpStream>>,
}

impl Link {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            control: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    /// Resolve and connect, trying every resolved address in turn.
    pub(crate) fn open(params: &ConnectionParameters, timeout: Option<Duration>) -> Result<TcpStream> {
        params.validate()?;
        let addr = params.address();
        let connect_err = |source| TransportError::Connect {
            addr: addr.clone(),
            source,
        };

        let candidates = (params.host.as_str(), params.port)
            .to_socket_addrs()
            .map_err(connect_err)?;

        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
        for candidate in candidates {
            let attempt = match timeout {
                Some(limit) => TcpStream::connect_timeout(&candidate, limit),
                None => TcpStream::connect(candidate),
            };
            match attempt {
                Ok(stream) => {
                    debug!(%addr, peer = %candidate, "tcp connection established");
                    return Ok(stream);
                }
                Err(e) => {
                    debug!(%addr, peer = %candidate, error = %e, "tcp connect attempt failed");
                    last_err = e;
                }
            }
        }
        Err(connect_err(last_err))
    }

    /// Take ownership of a connected socket and mark the link connected.
    pub(crate) fn install(&self, stream: TcpStream) -> Result<()> {
        let reader = stream.try_clone()?;
        let control = stream.try_clone()?;
        *lock(&self.writer) = Some(stream);
        *lock(&self.reader) = Some(reader);
        *lock(&self.control) = Some(control);
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Run `f` on the send handle under the send lock.
    pub(crate) fn with_writer<T>(&self, f: impl FnOnce(&mut TcpStream) -> Result<T>) -> Result<T> {
        let result = {
            let mut guard = lock(&self.writer);
            let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;
            f(stream)
        };
        self.close_on_fatal(result)
    }

    /// Run `f` on the receive handle under the receive lock.
    pub(crate) fn with_reader<T>(&self, f: impl FnOnce(&mut TcpStream) -> Result<T>) -> Result<T> {
        let result = {
            let mut guard = lock(&self.reader);
            let stream = guard.as_mut().ok_or(TransportError::NotConnected)?;
            f(stream)
        };
        self.close_on_fatal(result)
    }

    fn close_on_fatal<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                warn!(error = %e, "connection lost");
                self.close();
            }
        }
        result
    }

    /// Shut the socket down and drop every handle.
    ///
    /// Shutting down through the control handle first wakes any thread
    /// blocked on the other two before their locks are taken.
    pub(crate) fn close(&self) {
        if let Some(control) = lock(&self.control).take() {
            if let Err(e) = control.shutdown(Shutdown::Both) {
                debug!(error = %e, "socket shutdown failed, already closed");
            }
        }
        lock(&self.writer).take();
        lock(&self.reader).take();
        self.set_state(ConnectionState::Disconnected);
    }
}

pub(crate) fn enable_keepalive(stream: &TcpStream) {
    if let Err(e) = SockRef::from(stream).set_keepalive(true) {
        warn!(error = %e, "failed to enable TCP keepalive");
    }
}

/// Apply a receive timeout; `None` and zero both mean "block".
pub(crate) fn set_read_timeout(stream: &TcpStream, timeout: Option<Duration>) -> Result<()> {
    stream.set_read_timeout(timeout.filter(|t| !t.is_zero()))?;
    Ok(())
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// Fill `buf` at the start of a message.
///
/// A timeout before the first byte is a [`TransportError::Timeout`] and
/// leaves the stream usable. Once bytes have arrived any failure is fatal,
/// since the stream position inside the message is lost.
pub(crate) fn read_message_start(
    stream: &mut TcpStream,
    buf: &mut [u8],
    timeout: Option<Duration>,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(TransportError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if filled == 0 && is_timeout(&e) => {
                return Err(TransportError::Timeout(timeout.unwrap_or_default()));
            }
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
    Ok(())
}

/// Fill `buf` in the middle of a message. End of stream is `ConnectionClosed`.
pub(crate) fn read_rest(stream: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => TransportError::ConnectionClosed,
        _ => TransportError::Io(e),
    })
}
