//! Byte-stream transports.
//!
//! # Design
//! [`Connection`] is the one capability the request writer and the
//! response reader are written against. Two implementations exist: the
//! plain [`Transport`] here and `tls::TlsSession`, which layers TLS over a
//! `Transport`. Both report a clean peer close as a zero-length read.
//!
//! `Transport` is generic over its stream so tests can drive it with an
//! in-memory socket; production code uses `Transport<TcpStream>`.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use crate::config::Timeouts;
use crate::error::FetchError;
use crate::resolve::NetworkAddress;

/// An open, ordered byte stream to a peer.
///
/// After `close`, `read` and `write` fail with `TransportClosed`; a second
/// `close` is a no-op.
pub trait Connection {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed cleanly.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FetchError>;

    /// Write some prefix of `buf`, returning how many bytes were accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize, FetchError>;

    fn close(&mut self) -> Result<(), FetchError>;

    fn is_closed(&self) -> bool;

    /// Write all of `buf`, retrying the remainder after partial writes.
    fn write_all(&mut self, mut buf: &[u8]) -> Result<(), FetchError> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(FetchError::WriteError(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "transport accepted zero bytes",
                    )))
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connected,
    Closed,
}

/// A plain byte stream with exactly one owner.
pub struct Transport<S = TcpStream> {
    stream: Option<S>,
    peer: Option<SocketAddr>,
}

impl Transport<TcpStream> {
    /// Open a TCP connection to `address:port`, applying `timeouts`.
    pub fn connect(
        address: &NetworkAddress,
        port: u16,
        timeouts: &Timeouts,
    ) -> Result<Self, FetchError> {
        let addr = address.socket_addr(port);
        let stream = match timeouts.connect() {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| connect_error(addr, e))?;

        stream
            .set_read_timeout(timeouts.read())
            .and_then(|()| stream.set_write_timeout(timeouts.write()))
            .map_err(|source| FetchError::ConnectionRefused { addr, source })?;

        log::info!("connected to {address} on port {port}");
        Ok(Self {
            stream: Some(stream),
            peer: Some(addr),
        })
    }
}

fn connect_error(addr: SocketAddr, e: io::Error) -> FetchError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
            FetchError::ConnectionTimeout { addr }
        }
        _ => FetchError::ConnectionRefused { addr, source: e },
    }
}

impl<S: Read + Write> Transport<S> {
    /// Wrap an already-connected stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream: Some(stream),
            peer: None,
        }
    }

    /// Remote address, when the transport was opened by [`Transport::connect`].
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> TransportState {
        match self.stream {
            Some(_) => TransportState::Connected,
            None => TransportState::Closed,
        }
    }

    pub(crate) fn stream_mut(&mut self) -> Result<&mut S, FetchError> {
        self.stream.as_mut().ok_or(FetchError::TransportClosed)
    }
}

impl<S: Read + Write> Connection for Transport<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        let stream = self.stream_mut()?;
        loop {
            match stream.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::ReadError(e)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FetchError> {
        let stream = self.stream_mut()?;
        loop {
            match stream.write(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(FetchError::WriteError(e)),
            }
        }
    }

    fn close(&mut self) -> Result<(), FetchError> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            log::debug!("transport closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

impl<S> fmt::Debug for Transport<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("open", &self.stream.is_some())
            .field("peer", &self.peer)
            .finish()
    }
}
