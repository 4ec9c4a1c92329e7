//! In-memory peers for unit tests: a scripted socket and a rustls server.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

/// A `Read + Write` stream that replays a fixed script of read results and
/// records everything written to it. An exhausted script reads as EOF.
pub(crate) struct MockSocket {
    reads: VecDeque<io::Result<Vec<u8>>>,
    write_limit: Option<usize>,
    write_error: Option<io::ErrorKind>,
    handle: MockHandle,
}

/// Observes a `MockSocket` after it has been moved into a transport.
#[derive(Clone, Default)]
pub(crate) struct MockHandle {
    written: Rc<RefCell<Vec<u8>>>,
    dropped: Rc<Cell<u32>>,
}

impl MockHandle {
    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.borrow().clone()
    }

    /// How many times the socket has been dropped (released).
    pub(crate) fn drops(&self) -> u32 {
        self.dropped.get()
    }
}

impl MockSocket {
    pub(crate) fn new() -> Self {
        Self {
            reads: VecDeque::new(),
            write_limit: None,
            write_error: None,
            handle: MockHandle::default(),
        }
    }

    pub(crate) fn chunk(mut self, bytes: &[u8]) -> Self {
        self.reads.push_back(Ok(bytes.to_vec()));
        self
    }

    pub(crate) fn fail_read(mut self, kind: io::ErrorKind) -> Self {
        self.reads.push_back(Err(io::Error::new(kind, "scripted read failure")));
        self
    }

    /// Accept at most `limit` bytes per `write` call.
    pub(crate) fn write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    pub(crate) fn fail_writes(mut self, kind: io::ErrorKind) -> Self {
        self.write_error = Some(kind);
        self
    }

    pub(crate) fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Read for MockSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(Err(e)) => Err(e),
            Some(Ok(mut chunk)) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(Ok(chunk.split_off(n)));
                }
                Ok(n)
            }
        }
    }
}

impl Write for MockSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        let n = self.write_limit.map_or(buf.len(), |limit| limit.min(buf.len()));
        self.handle.written.borrow_mut().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.handle.dropped.set(self.handle.dropped.get() + 1);
    }
}

/// An in-memory TLS server for the `localhost` test certificate. Bytes the
/// client writes are fed straight into a rustls `ServerConnection`; reads
/// return whatever the server has queued, or EOF when it has nothing.
pub(crate) struct TlsPeer {
    server: Rc<RefCell<rustls::ServerConnection>>,
    handle: MockHandle,
}

/// Observes a `TlsPeer` after it has been moved into a transport.
#[derive(Clone)]
pub(crate) struct TlsPeerHandle {
    server: Rc<RefCell<rustls::ServerConnection>>,
    socket: MockHandle,
}

impl TlsPeerHandle {
    pub(crate) fn written(&self) -> Vec<u8> {
        self.socket.written()
    }

    pub(crate) fn drops(&self) -> u32 {
        self.socket.drops()
    }

    /// Queue application data from the server to the client.
    pub(crate) fn send(&self, data: &[u8]) {
        self.server.borrow_mut().writer().write_all(data).unwrap();
    }

    pub(crate) fn send_close_notify(&self) {
        self.server.borrow_mut().send_close_notify();
    }

    /// Application data the server has received, and whether the client's
    /// close_notify has arrived.
    pub(crate) fn received(&self) -> (Vec<u8>, bool) {
        let mut server = self.server.borrow_mut();
        let mut data = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match server.reader().read(&mut buf) {
                Ok(0) => return (data, true),
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return (data, false),
                Err(e) => panic!("server read failed: {e}"),
            }
        }
    }
}

pub(crate) fn fixture(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Client options that trust the test CA.
pub(crate) fn trusting_test_ca() -> crate::config::TlsOptions {
    crate::config::TlsOptions {
        extra_root_certificates: vec![fixture("ca.pem")],
        ..crate::config::TlsOptions::default()
    }
}

impl TlsPeer {
    pub(crate) fn new() -> Self {
        use rustls::pki_types::pem::PemObject;
        use rustls::pki_types::{CertificateDer, PrivateKeyDer};

        let certs = CertificateDer::pem_file_iter(fixture("localhost.pem"))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let key = PrivateKeyDer::from_pem_file(fixture("localhost.key")).unwrap();
        let config = rustls::ServerConfig::builder_with_provider(std::sync::Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .unwrap();
        let server = rustls::ServerConnection::new(std::sync::Arc::new(config)).unwrap();

        Self {
            server: Rc::new(RefCell::new(server)),
            handle: MockHandle::default(),
        }
    }

    pub(crate) fn handle(&self) -> TlsPeerHandle {
        TlsPeerHandle {
            server: Rc::clone(&self.server),
            socket: self.handle.clone(),
        }
    }
}

impl Read for TlsPeer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut server = self.server.borrow_mut();
        if !server.wants_write() {
            return Ok(0);
        }
        let mut out: &mut [u8] = buf;
        server.write_tls(&mut out)
    }
}

impl Write for TlsPeer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle.written.borrow_mut().extend_from_slice(buf);
        let mut server = self.server.borrow_mut();
        let mut incoming = buf;
        while !incoming.is_empty() {
            server.read_tls(&mut incoming)?;
            server.process_new_packets().map_err(io::Error::other)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for TlsPeer {
    fn drop(&mut self) {
        self.handle.dropped.set(self.handle.dropped.get() + 1);
    }
}
