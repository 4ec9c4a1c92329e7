//! Minimal blocking HTTP(S) fetch over TCP and TLS.
//!
//! # Overview
//! Given a URL, the crate resolves the host, opens a TCP connection,
//! optionally layers a TLS session on it, writes a literal HTTP/1.0
//! request with `Connection: close`, and streams the raw response into a
//! caller-supplied sink until the server closes the stream.
//!
//! # Design
//! - Everything is synchronous and single-threaded; each fetch owns its
//!   transport, session and read buffer.
//! - Plain and TLS streams share one capability trait,
//!   [`transport::Connection`], so the request writer and response reader
//!   are written once.
//! - Every failure is a typed [`FetchError`] returned to the caller.
//!   Nothing in the crate exits the process or prints.
//! - Response bytes are not parsed: no header handling, chunked decoding,
//!   redirects or connection reuse.

pub mod cert;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod reader;
pub mod resolve;
pub mod tls;
pub mod transport;
pub mod url;

#[cfg(test)]
pub(crate) mod testing;

pub use cert::PeerCertificate;
pub use client::{fetch, FetchClient, FetchReport};
pub use config::{FetchOptions, Timeouts, TlsOptions};
pub use error::{ErrorKind, FetchError};
pub use http::build_request;
pub use reader::{drain, ResponseBuffer, DEFAULT_BUFFER_SIZE};
pub use resolve::{resolve, NetworkAddress, Resolve, SystemResolver};
pub use tls::{EstablishFailure, TlsSession};
pub use transport::{Connection, Transport, TransportState};
pub use url::{parse, ParsedUrl, Scheme};
