//! HTTP/1.0 request composition.
//!
//! The request is a fixed template. `Connection: close` asks the server to
//! close the stream after the response, which is how the response reader
//! knows the response is complete.

/// Protocol version written on the request line.
pub const HTTP_VERSION: &str = "HTTP/1.0";

/// Compose `GET {path} HTTP/1.0` with `Host` and `Connection: close` headers.
///
/// `host` and `path` are inserted verbatim; `url::parse` guarantees they
/// carry no whitespace or control characters.
pub fn build_request(host: &str, path: &str) -> Vec<u8> {
    format!("GET {path} {HTTP_VERSION}\r\nHost: {host}\r\nConnection: close\r\n\r\n").into_bytes()
}
