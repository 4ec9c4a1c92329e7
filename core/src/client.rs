//! One-shot fetch orchestration.
//!
//! # Design
//! `FetchClient` holds only its options and a resolver and carries no state
//! between fetches. Each `fetch` runs decompose → resolve → connect →
//! (handshake) → write request → drain → close, and the transport or
//! session is closed on every path once it exists, including error paths.
//! Policy decisions (is a missing certificate fatal? is a read error?) are
//! left to the caller; the returned [`FetchReport`] says what happened.

use std::io::Write;

use serde::Serialize;

use crate::config::FetchOptions;
use crate::error::FetchError;
use crate::http::build_request;
use crate::reader::{drain_with_buffer, ResponseBuffer};
use crate::resolve::{Resolve, SystemResolver};
use crate::tls::TlsSession;
use crate::transport::{Connection, Transport};
use crate::url::{self, Scheme};

/// Summary of a completed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub url: String,
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    pub address: String,
    pub tls: bool,
    /// Subject of the peer's leaf certificate; `None` for plain HTTP or
    /// when the peer presented no certificate.
    pub peer_certificate_subject: Option<String>,
    pub bytes_received: u64,
}

/// Synchronous HTTP/1.0 fetcher.
#[derive(Debug, Clone)]
pub struct FetchClient<R = SystemResolver> {
    options: FetchOptions,
    resolver: R,
}

impl FetchClient<SystemResolver> {
    pub fn new(options: FetchOptions) -> Self {
        Self {
            options,
            resolver: SystemResolver,
        }
    }
}

impl Default for FetchClient<SystemResolver> {
    fn default() -> Self {
        Self::new(FetchOptions::default())
    }
}

impl<R: Resolve> FetchClient<R> {
    pub fn with_resolver(options: FetchOptions, resolver: R) -> Self {
        Self { options, resolver }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetch `url` and stream the raw response (status line, headers and
    /// body) into `sink` until the server closes the connection.
    pub fn fetch<W: Write + ?Sized>(&self, url: &str, sink: &mut W) -> Result<FetchReport, FetchError> {
        self.options.validate()?;
        let parsed = url::parse(url)?;
        let address = self.resolver.resolve(parsed.host())?;
        let transport = Transport::connect(&address, parsed.port(), &self.options.timeouts)?;
        let request = build_request(&parsed.host_header(), parsed.path());

        let mut report = FetchReport {
            url: parsed.to_string(),
            scheme: parsed.scheme(),
            host: parsed.host().to_string(),
            port: parsed.port(),
            address: address.ip().to_string(),
            tls: parsed.scheme().is_tls(),
            peer_certificate_subject: None,
            bytes_received: 0,
        };

        report.bytes_received = match parsed.scheme() {
            Scheme::Http => self.exchange(transport, &request, sink)?,
            Scheme::Https => {
                let session = TlsSession::establish(transport, parsed.host(), &self.options.tls)
                    .map_err(|failure| {
                        let (error, mut transport) = failure.into_parts();
                        let _ = transport.close();
                        error
                    })?;
                report.peer_certificate_subject =
                    session.peer_certificate().map(|cert| cert.subject().to_string());
                self.exchange(session, &request, sink)?
            }
        };

        log::info!("finished fetching {} ({} bytes)", report.url, report.bytes_received);
        Ok(report)
    }

    /// Send `request`, drain the response, and close `conn` regardless of
    /// the outcome. The first error wins.
    fn exchange<C: Connection, W: Write + ?Sized>(
        &self,
        mut conn: C,
        request: &[u8],
        sink: &mut W,
    ) -> Result<u64, FetchError> {
        let mut buffer = ResponseBuffer::with_capacity(self.options.buffer_size);
        let result = conn
            .write_all(request)
            .and_then(|()| drain_with_buffer(&mut conn, sink, &mut buffer));
        let closed = conn.close();
        let received = result?;
        closed?;
        Ok(received)
    }
}

/// Fetch `url` with default options, writing the response to `sink`.
pub fn fetch<W: Write + ?Sized>(url: &str, sink: &mut W) -> Result<FetchReport, FetchError> {
    FetchClient::default().fetch(url, sink)
}
