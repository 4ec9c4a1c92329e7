//! Error types for the fetch core.
//!
//! # Design
//! Each variant names the fetch phase that failed, so callers can decide
//! policy (retry, abort, ignore) without inspecting message text. Wrapped
//! `io::Error`s stay reachable through `source()`. Nothing in the core
//! terminates the process; every failure is returned to the caller.

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors returned by every fallible operation in `fetch-core`.
#[derive(Debug)]
pub enum FetchError {
    /// The URL has no `://` separator, an unknown scheme, or an empty host.
    MalformedUrl(String),

    /// The `:port` suffix is not a decimal number in `1..=65535`.
    InvalidPort(String),

    /// Name resolution produced no address for the host.
    UnresolvedHost { host: String, reason: String },

    /// The peer actively refused, or the connect failed for a non-timeout reason.
    ConnectionRefused { addr: SocketAddr, source: io::Error },

    /// The connect did not complete within the configured timeout.
    ConnectionTimeout { addr: SocketAddr },

    /// Process-wide TLS initialisation did not succeed.
    TlsLibraryInitFailed(String),

    /// The TLS client context or session could not be created.
    TlsContextCreationFailed(String),

    /// The TLS handshake did not complete.
    HandshakeFailed(String),

    /// The underlying write failed or accepted zero bytes.
    WriteError(io::Error),

    /// The underlying read failed. Never used for a clean peer close.
    ReadError(io::Error),

    /// An operation was attempted on a closed transport or session.
    TransportClosed,

    /// The output sink rejected response bytes.
    SinkError(io::Error),

    /// Fetch options could not be loaded or are out of range.
    InvalidConfig(String),
}

/// Fieldless discriminant of `FetchError`, for mapping to codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedUrl,
    InvalidPort,
    UnresolvedHost,
    ConnectionRefused,
    ConnectionTimeout,
    TlsLibraryInitFailed,
    TlsContextCreationFailed,
    HandshakeFailed,
    WriteError,
    ReadError,
    TransportClosed,
    SinkError,
    InvalidConfig,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::MalformedUrl(_) => ErrorKind::MalformedUrl,
            FetchError::InvalidPort(_) => ErrorKind::InvalidPort,
            FetchError::UnresolvedHost { .. } => ErrorKind::UnresolvedHost,
            FetchError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
            FetchError::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            FetchError::TlsLibraryInitFailed(_) => ErrorKind::TlsLibraryInitFailed,
            FetchError::TlsContextCreationFailed(_) => ErrorKind::TlsContextCreationFailed,
            FetchError::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
            FetchError::WriteError(_) => ErrorKind::WriteError,
            FetchError::ReadError(_) => ErrorKind::ReadError,
            FetchError::TransportClosed => ErrorKind::TransportClosed,
            FetchError::SinkError(_) => ErrorKind::SinkError,
            FetchError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::MalformedUrl(url) => write!(f, "malformed URL: {url}"),
            FetchError::InvalidPort(port) => write!(f, "invalid port: {port}"),
            FetchError::UnresolvedHost { host, reason } => {
                write!(f, "cannot resolve hostname {host}: {reason}")
            }
            FetchError::ConnectionRefused { addr, source } => {
                write!(f, "cannot connect to {addr}: {source}")
            }
            FetchError::ConnectionTimeout { addr } => {
                write!(f, "timed out connecting to {addr}")
            }
            FetchError::TlsLibraryInitFailed(msg) => {
                write!(f, "could not initialize the TLS library: {msg}")
            }
            FetchError::TlsContextCreationFailed(msg) => {
                write!(f, "unable to create TLS context: {msg}")
            }
            FetchError::HandshakeFailed(msg) => write!(f, "TLS handshake failed: {msg}"),
            FetchError::WriteError(e) => write!(f, "error writing to transport: {e}"),
            FetchError::ReadError(e) => write!(f, "error reading from transport: {e}"),
            FetchError::TransportClosed => write!(f, "transport is closed"),
            FetchError::SinkError(e) => write!(f, "error writing to output sink: {e}"),
            FetchError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::ConnectionRefused { source, .. } => Some(source),
            FetchError::WriteError(e) | FetchError::ReadError(e) | FetchError::SinkError(e) => {
                Some(e)
            }
            _ => None,
        }
    }
}
