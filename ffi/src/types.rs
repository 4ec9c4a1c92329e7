//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Each type mirrors a core type with C-compatible fields: `*mut c_char`
//! for strings, pointer + length for byte buffers, and enums with explicit
//! discriminants. Conversions live here so `lib.rs` stays focused on the
//! `extern "C"` surface.

use std::ffi::{c_void, CString};
use std::io;
use std::os::raw::c_char;

use fetch_core::{ErrorKind, FetchError, FetchReport, ParsedUrl, Scheme};

/// Opaque handle to a `FetchClient`.
pub struct FfiFetchClient {
    pub(crate) inner: fetch_core::FetchClient,
}

/// Allocate a C string. Interior NULs cannot come out of the core (URLs
/// with control characters are rejected), so they collapse to "".
pub(crate) fn to_c_string(s: &str) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

pub(crate) fn free_c_string(s: *mut c_char) {
    if !s.is_null() {
        drop(unsafe { CString::from_raw(s) });
    }
}

// ---------------------------------------------------------------------------
// Callback sink
// ---------------------------------------------------------------------------

/// Receives response bytes as they arrive. Return `false` to abort the
/// fetch; it then fails with `FfiErrorCode::SinkError`.
pub type FetchWriteCallback =
    extern "C" fn(data: *const u8, len: usize, user_data: *mut c_void) -> bool;

/// Adapts a C callback to `io::Write`.
pub(crate) struct CallbackSink {
    pub(crate) callback: FetchWriteCallback,
    pub(crate) user_data: *mut c_void,
}

impl io::Write for CallbackSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if (self.callback)(buf.as_ptr(), buf.len(), self.user_data) {
            Ok(buf.len())
        } else {
            Err(io::Error::other("write callback rejected the data"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plain data
// ---------------------------------------------------------------------------

#[repr(C)]
pub enum FfiScheme {
    Http = 0,
    Https = 1,
}

impl From<Scheme> for FfiScheme {
    fn from(s: Scheme) -> Self {
        match s {
            Scheme::Http => FfiScheme::Http,
            Scheme::Https => FfiScheme::Https,
        }
    }
}

/// A decomposed URL. IPv6 hosts are unbracketed.
#[repr(C)]
pub struct FfiParsedUrl {
    pub scheme: FfiScheme,
    pub host: *mut c_char,
    pub port: u16,
    pub path: *mut c_char,
}

impl FfiParsedUrl {
    pub(crate) fn from_core(url: &ParsedUrl) -> Self {
        FfiParsedUrl {
            scheme: url.scheme().into(),
            host: to_c_string(url.host()),
            port: url.port(),
            path: to_c_string(url.path()),
        }
    }

    pub(crate) fn free_fields(&self) {
        free_c_string(self.host);
        free_c_string(self.path);
    }
}

/// Raw bytes owned by the library. Release with `fetch_free_buffer`.
#[repr(C)]
pub struct FfiBuffer {
    pub data: *mut u8,
    pub len: usize,
}

impl FfiBuffer {
    pub(crate) fn from_vec(bytes: Vec<u8>) -> *mut Self {
        let len = bytes.len();
        let data = Box::into_raw(bytes.into_boxed_slice()) as *mut u8;
        Box::into_raw(Box::new(FfiBuffer { data, len }))
    }
}

/// Summary of a completed fetch. `peer_certificate_subject` is null for
/// plain HTTP or when the server sent no certificate.
#[repr(C)]
pub struct FfiFetchReport {
    pub url: *mut c_char,
    pub scheme: FfiScheme,
    pub host: *mut c_char,
    pub port: u16,
    pub address: *mut c_char,
    pub tls: bool,
    pub peer_certificate_subject: *mut c_char,
    pub bytes_received: u64,
}

impl FfiFetchReport {
    pub(crate) fn from_core(report: FetchReport) -> Self {
        FfiFetchReport {
            url: to_c_string(&report.url),
            scheme: report.scheme.into(),
            host: to_c_string(&report.host),
            port: report.port,
            address: to_c_string(&report.address),
            tls: report.tls,
            peer_certificate_subject: report
                .peer_certificate_subject
                .as_deref()
                .map_or(std::ptr::null_mut(), to_c_string),
            bytes_received: report.bytes_received,
        }
    }

    pub(crate) fn free_fields(&self) {
        free_c_string(self.url);
        free_c_string(self.host);
        free_c_string(self.address);
        free_c_string(self.peer_certificate_subject);
    }
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned in `FfiFetchResult`. One per core error kind,
/// plus `Panic` and `NullArg` for failures at the boundary itself.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    MalformedUrl = 1,
    InvalidPort = 2,
    UnresolvedHost = 3,
    ConnectionRefused = 4,
    ConnectionTimeout = 5,
    TlsLibraryInitFailed = 6,
    TlsContextCreationFailed = 7,
    HandshakeFailed = 8,
    WriteError = 9,
    ReadError = 10,
    TransportClosed = 11,
    SinkError = 12,
    InvalidConfig = 13,
    Panic = 14,
    NullArg = 15,
}

impl From<ErrorKind> for FfiErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::MalformedUrl => FfiErrorCode::MalformedUrl,
            ErrorKind::InvalidPort => FfiErrorCode::InvalidPort,
            ErrorKind::UnresolvedHost => FfiErrorCode::UnresolvedHost,
            ErrorKind::ConnectionRefused => FfiErrorCode::ConnectionRefused,
            ErrorKind::ConnectionTimeout => FfiErrorCode::ConnectionTimeout,
            ErrorKind::TlsLibraryInitFailed => FfiErrorCode::TlsLibraryInitFailed,
            ErrorKind::TlsContextCreationFailed => FfiErrorCode::TlsContextCreationFailed,
            ErrorKind::HandshakeFailed => FfiErrorCode::HandshakeFailed,
            ErrorKind::WriteError => FfiErrorCode::WriteError,
            ErrorKind::ReadError => FfiErrorCode::ReadError,
            ErrorKind::TransportClosed => FfiErrorCode::TransportClosed,
            ErrorKind::SinkError => FfiErrorCode::SinkError,
            ErrorKind::InvalidConfig => FfiErrorCode::InvalidConfig,
        }
    }
}

/// Tag that tells `fetch_free_result` what `FfiFetchResult::data` points to.
#[repr(C)]
pub enum FfiDataTag {
    None = 0,
    ParsedUrl = 1,
    Report = 2,
}

/// Result envelope for every fallible operation.
///
/// On success `error_code` is `Ok`, `error_message` is null and `data`
/// points to the payload named by `data_tag`. On failure `error_message`
/// is a C string and `data` is null.
#[repr(C)]
pub struct FfiFetchResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub data_tag: FfiDataTag,
    pub data: *mut c_void,
}

impl FfiFetchResult {
    fn boxed(
        error_code: FfiErrorCode,
        message: Option<String>,
        data_tag: FfiDataTag,
        data: *mut c_void,
    ) -> *mut Self {
        Box::into_raw(Box::new(FfiFetchResult {
            error_code,
            error_message: message.as_deref().map_or(std::ptr::null_mut(), to_c_string),
            data_tag,
            data,
        }))
    }

    pub(crate) fn ok_parsed_url(url: &ParsedUrl) -> *mut Self {
        let data = Box::into_raw(Box::new(FfiParsedUrl::from_core(url))) as *mut c_void;
        Self::boxed(FfiErrorCode::Ok, None, FfiDataTag::ParsedUrl, data)
    }

    pub(crate) fn ok_report(report: FetchReport) -> *mut Self {
        let data = Box::into_raw(Box::new(FfiFetchReport::from_core(report))) as *mut c_void;
        Self::boxed(FfiErrorCode::Ok, None, FfiDataTag::Report, data)
    }

    pub(crate) fn from_error(err: FetchError) -> *mut Self {
        Self::boxed(
            err.kind().into(),
            Some(err.to_string()),
            FfiDataTag::None,
            std::ptr::null_mut(),
        )
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::NullArg,
            Some(format!("null argument: {name}")),
            FfiDataTag::None,
            std::ptr::null_mut(),
        )
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::boxed(
            FfiErrorCode::Panic,
            Some(msg.to_string()),
            FfiDataTag::None,
            std::ptr::null_mut(),
        )
    }
}
