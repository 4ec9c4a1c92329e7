//! TLS sessions layered over a [`Transport`].
//!
//! # Design
//! The TLS library is initialised once per process by [`init`], which
//! installs the `ring` crypto provider as the rustls default unless the
//! host application already installed one. There is no teardown.
//!
//! [`TlsSession::establish`] consumes a connected transport. On failure the
//! transport is handed back inside [`EstablishFailure`] so the caller still
//! owns it and decides when to close it. A session closes its TLS state
//! first (best-effort `close_notify`) and then its transport, once.
//!
//! Certificate verification is whatever rustls does by default against
//! the bundled web PKI roots, plus any extra roots from [`TlsOptions`].
//! The peer certificate is only captured for display.
//!
//! A peer that drops TCP without close_notify ends the stream like a clean
//! close, with a warning, unless `TlsOptions::require_close_notify` is set;
//! then it is a `ReadError`.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::cert::PeerCertificate;
use crate::config::TlsOptions;
use crate::error::FetchError;
use crate::transport::{Connection, Transport};

static PROVIDER: OnceLock<Result<Arc<CryptoProvider>, String>> = OnceLock::new();

/// Initialise the TLS library for this process. Safe to call repeatedly;
/// only the first call does any work.
pub fn init() -> Result<(), FetchError> {
    provider().map(|_| ())
}

fn provider() -> Result<Arc<CryptoProvider>, FetchError> {
    PROVIDER
        .get_or_init(|| {
            if let Some(installed) = CryptoProvider::get_default() {
                return Ok(Arc::clone(installed));
            }
            // Losing an install race to another thread still leaves a default.
            let _ = rustls::crypto::ring::default_provider().install_default();
            CryptoProvider::get_default()
                .cloned()
                .ok_or_else(|| "no process-wide crypto provider could be installed".to_string())
        })
        .clone()
        .map_err(FetchError::TlsLibraryInitFailed)
}

/// Build the client context for `options`.
pub fn client_config(options: &TlsOptions) -> Result<Arc<ClientConfig>, FetchError> {
    let provider = provider()?;
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| FetchError::TlsContextCreationFailed(e.to_string()))?;

    let config = if options.insecure_skip_verify {
        log::warn!("TLS certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    } else {
        builder
            .with_root_certificates(root_store(options)?)
            .with_no_client_auth()
    };
    Ok(Arc::new(config))
}

fn root_store(options: &TlsOptions) -> Result<RootCertStore, FetchError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    for path in &options.extra_root_certificates {
        let context = |e: &dyn fmt::Display| {
            FetchError::TlsContextCreationFailed(format!("{}: {e}", path.display()))
        };
        let mut added = 0usize;
        for cert in CertificateDer::pem_file_iter(path).map_err(|e| context(&e))? {
            let cert = cert.map_err(|e| context(&e))?;
            roots.add(cert).map_err(|e| context(&e))?;
            added += 1;
        }
        if added == 0 {
            return Err(context(&"no certificates found"));
        }
        log::debug!("trusting {added} extra root(s) from {}", path.display());
    }
    Ok(roots)
}

/// A secured session over a transport.
pub struct TlsSession<S: Read + Write = TcpStream> {
    conn: Option<ClientConnection>,
    transport: Transport<S>,
    peer_certificate: Option<PeerCertificate>,
    require_close_notify: bool,
}

/// A failed [`TlsSession::establish`], returning the transport to the caller.
pub struct EstablishFailure<S> {
    pub error: FetchError,
    pub transport: Transport<S>,
}

impl<S> EstablishFailure<S> {
    pub fn into_transport(self) -> Transport<S> {
        self.transport
    }

    pub fn into_parts(self) -> (FetchError, Transport<S>) {
        (self.error, self.transport)
    }
}

impl<S> From<EstablishFailure<S>> for FetchError {
    fn from(failure: EstablishFailure<S>) -> Self {
        failure.error
    }
}

impl<S> fmt::Debug for EstablishFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstablishFailure")
            .field("error", &self.error)
            .field("transport", &self.transport)
            .finish()
    }
}

impl<S> fmt::Display for EstablishFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<S> std::error::Error for EstablishFailure<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<S: Read + Write> TlsSession<S> {
    /// Attach a TLS client to `transport` and run the handshake for
    /// `server_name`.
    pub fn establish(
        transport: Transport<S>,
        server_name: &str,
        options: &TlsOptions,
    ) -> Result<Self, EstablishFailure<S>> {
        match client_config(options) {
            Ok(config) => Self::establish_with_config(transport, server_name, config)
                .map(|session| session.with_close_notify_required(options.require_close_notify)),
            Err(error) => Err(EstablishFailure { error, transport }),
        }
    }

    /// [`TlsSession::establish`] with a prepared client context.
    pub fn establish_with_config(
        mut transport: Transport<S>,
        server_name: &str,
        config: Arc<ClientConfig>,
    ) -> Result<Self, EstablishFailure<S>> {
        let conn = ServerName::try_from(server_name.to_string())
            .map_err(|e| FetchError::TlsContextCreationFailed(format!("{server_name}: {e}")))
            .and_then(|name| {
                ClientConnection::new(config, name)
                    .map_err(|e| FetchError::TlsContextCreationFailed(e.to_string()))
            });
        let mut conn = match conn {
            Ok(conn) => conn,
            Err(error) => return Err(EstablishFailure { error, transport }),
        };

        if let Err(error) = handshake(&mut conn, &mut transport) {
            log::warn!("could not build a TLS session to {server_name}: {error}");
            return Err(EstablishFailure { error, transport });
        }

        let peer_certificate = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|leaf| PeerCertificate::from_der(leaf.as_ref().to_vec()));
        match &peer_certificate {
            Some(cert) => log::info!("retrieved certificate from {server_name}: {}", cert.subject()),
            None => log::warn!("{server_name} presented no certificate"),
        }
        log::info!(
            "TLS session established with {server_name} ({:?}, {:?})",
            conn.protocol_version(),
            conn.negotiated_cipher_suite().map(|suite| suite.suite()),
        );

        Ok(Self {
            conn: Some(conn),
            transport,
            peer_certificate,
            require_close_notify: false,
        })
    }

    /// Whether an EOF without close_notify is reported as `ReadError`.
    pub fn with_close_notify_required(mut self, required: bool) -> Self {
        self.require_close_notify = required;
        self
    }

    /// Leaf certificate captured when the handshake completed.
    pub fn peer_certificate(&self) -> Option<&PeerCertificate> {
        self.peer_certificate.as_ref()
    }

    pub fn transport(&self) -> &Transport<S> {
        &self.transport
    }
}

fn handshake<S: Read + Write>(
    conn: &mut ClientConnection,
    transport: &mut Transport<S>,
) -> Result<(), FetchError> {
    let stream = transport.stream_mut()?;
    while conn.is_handshaking() {
        match conn.complete_io(stream) {
            Ok((0, 0)) if conn.is_handshaking() => {
                return Err(FetchError::HandshakeFailed(
                    "peer stopped responding during the handshake".into(),
                ))
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(FetchError::HandshakeFailed(e.to_string())),
        }
    }
    Ok(())
}

impl<S: Read + Write> Connection for TlsSession<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FetchError> {
        let strict = self.require_close_notify;
        let conn = self.conn.as_mut().ok_or(FetchError::TransportClosed)?;
        let mut tls = rustls::Stream::new(conn, self.transport.stream_mut()?);
        loop {
            match tls.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !strict => {
                    log::warn!("peer closed the connection without close_notify");
                    return Ok(0);
                }
                Err(e) => return Err(FetchError::ReadError(e)),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FetchError> {
        let conn = self.conn.as_mut().ok_or(FetchError::TransportClosed)?;
        let mut tls = rustls::Stream::new(conn, self.transport.stream_mut()?);
        let n = tls.write(buf).map_err(FetchError::WriteError)?;
        tls.flush().map_err(FetchError::WriteError)?;
        Ok(n)
    }

    fn close(&mut self) -> Result<(), FetchError> {
        if let Some(mut conn) = self.conn.take() {
            conn.send_close_notify();
            if let Ok(stream) = self.transport.stream_mut() {
                while conn.wants_write() {
                    match conn.write_tls(stream) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            }
            log::debug!("TLS session closed");
        }
        self.transport.close()
    }

    fn is_closed(&self) -> bool {
        self.conn.is_none() || self.transport.is_closed()
    }
}

impl<S: Read + Write> fmt::Debug for TlsSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSession")
            .field("secured", &self.conn.is_some())
            .field("transport", &self.transport)
            .field("peer_certificate", &self.peer_certificate)
            .field("require_close_notify", &self.require_close_notify)
            .finish()
    }
}

/// Accepts any certificate chain and name; still checks that the
/// handshake was signed by the presented key.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
