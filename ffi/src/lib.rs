//! C-ABI wrapper around `fetch-core`.
//!
//! # Overview
//! Exposes URL decomposition, request building and the blocking fetch
//! itself through `extern "C"` functions. Response bytes are handed to a
//! C callback as they arrive, so the caller chooses where they go.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - A single `FfiFetchResult` envelope with `FfiDataTag` + `void* data`
//!   conveys success payloads and errors uniformly.
//! - The C caller owns all returned pointers and must call the matching
//!   `fetch_free_*` function to release them.

pub mod types;

use std::ffi::{c_void, CStr};
use std::os::raw::c_char;
use std::panic::catch_unwind;

use fetch_core::{FetchClient, FetchOptions};

use types::*;

/// Borrow a C string as UTF-8. Invalid UTF-8 reads as "", which every
/// operation below then rejects as malformed.
fn borrow_str<'a>(s: *const c_char) -> &'a str {
    unsafe { CStr::from_ptr(s) }.to_str().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Library lifecycle
// ---------------------------------------------------------------------------

/// Initialise the TLS library. Optional: the first HTTPS fetch does it
/// anyway. Safe to call more than once.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_init() -> FfiErrorCode {
    catch_unwind(|| match fetch_core::tls::init() {
        Ok(()) => FfiErrorCode::Ok,
        Err(e) => e.kind().into(),
    })
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Client lifecycle
// ---------------------------------------------------------------------------

/// Create a `FetchClient`.
///
/// `options_json` may be null for defaults; otherwise it is a JSON
/// `FetchOptions` document. Returns null if the options do not parse or
/// are out of range, or if an internal panic occurs. Free the result with
/// `fetch_client_free`.
///
/// When `error_message` is non-null it is set to null on success, or to a
/// description of the rejected options on failure. Release that string
/// with `fetch_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_client_new(
    options_json: *const c_char,
    error_message: *mut *mut c_char,
) -> *mut FfiFetchClient {
    let report = |message: Option<&str>| {
        if !error_message.is_null() {
            unsafe { *error_message = message.map_or(std::ptr::null_mut(), to_c_string) };
        }
    };
    catch_unwind(|| {
        report(None);
        let options = if options_json.is_null() {
            FetchOptions::default()
        } else {
            match FetchOptions::from_json_str(borrow_str(options_json)) {
                Ok(options) => options,
                Err(e) => {
                    report(Some(&e.to_string()));
                    return std::ptr::null_mut();
                }
            }
        };
        Box::into_raw(Box::new(FfiFetchClient {
            inner: FetchClient::new(options),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a client created by `fetch_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_client_free(client: *mut FfiFetchClient) {
    if !client.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { Box::from_raw(client) });
        });
    }
}

// ---------------------------------------------------------------------------
// Offline operations
// ---------------------------------------------------------------------------

/// Decompose `url` without touching the network.
///
/// Returns a result with `data_tag = ParsedUrl` on success.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_parse_url(url: *const c_char) -> *mut FfiFetchResult {
    catch_unwind(|| {
        if url.is_null() {
            return FfiFetchResult::null_arg("url");
        }
        match fetch_core::parse(borrow_str(url)) {
            Ok(parsed) => FfiFetchResult::ok_parsed_url(&parsed),
            Err(e) => FfiFetchResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiFetchResult::panic("panic in fetch_parse_url"))
}

/// The exact request bytes a fetch of `url` would send.
///
/// Returns null if `url` is null or does not parse. Free the result with
/// `fetch_free_buffer`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_build_request(url: *const c_char) -> *mut FfiBuffer {
    catch_unwind(|| {
        if url.is_null() {
            return std::ptr::null_mut();
        }
        match fetch_core::parse(borrow_str(url)) {
            Ok(parsed) => FfiBuffer::from_vec(fetch_core::build_request(
                &parsed.host_header(),
                parsed.path(),
            )),
            Err(_) => std::ptr::null_mut(),
        }
    })
    .unwrap_or(std::ptr::null_mut())
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetch `url`, passing the raw response to `callback` chunk by chunk.
///
/// `callback` may be null to discard the response. `user_data` is passed
/// through untouched. Blocks until the server closes the connection or an
/// error occurs. Returns a result with `data_tag = Report` on success.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_url(
    client: *const FfiFetchClient,
    url: *const c_char,
    callback: Option<FetchWriteCallback>,
    user_data: *mut c_void,
) -> *mut FfiFetchResult {
    catch_unwind(|| {
        if client.is_null() {
            return FfiFetchResult::null_arg("client");
        }
        if url.is_null() {
            return FfiFetchResult::null_arg("url");
        }
        let client = unsafe { &*client };
        let url = borrow_str(url);

        let result = match callback {
            Some(callback) => client
                .inner
                .fetch(url, &mut CallbackSink { callback, user_data }),
            None => client.inner.fetch(url, &mut std::io::sink()),
        };
        match result {
            Ok(report) => FfiFetchResult::ok_report(report),
            Err(e) => FfiFetchResult::from_error(e),
        }
    })
    .unwrap_or_else(|_| FfiFetchResult::panic("panic in fetch_url"))
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiFetchResult`. Safe to call with null. Uses `data_tag` to
/// determine what `data` points to.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_result(result: *mut FfiFetchResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let result = unsafe { Box::from_raw(result) };
        free_c_string(result.error_message);
        if result.data.is_null() {
            return;
        }
        match result.data_tag {
            FfiDataTag::ParsedUrl => {
                let url = unsafe { Box::from_raw(result.data as *mut FfiParsedUrl) };
                url.free_fields();
            }
            FfiDataTag::Report => {
                let report = unsafe { Box::from_raw(result.data as *mut FfiFetchReport) };
                report.free_fields();
            }
            FfiDataTag::None => {}
        }
    });
}

/// Free a buffer returned by `fetch_build_request`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_buffer(buffer: *mut FfiBuffer) {
    if buffer.is_null() {
        return;
    }
    let _ = catch_unwind(|| {
        let buffer = unsafe { Box::from_raw(buffer) };
        if !buffer.data.is_null() {
            let bytes = std::ptr::slice_from_raw_parts_mut(buffer.data, buffer.len);
            drop(unsafe { Box::from_raw(bytes) });
        }
    });
}

/// Free a C string allocated by this library, such as the `error_message`
/// set by `fetch_client_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_string(s: *mut c_char) {
    let _ = catch_unwind(|| free_c_string(s));
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn start_mock_server() -> std::net::SocketAddr {
        let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = std_listener.local_addr().unwrap();
        std_listener.set_nonblocking(true).unwrap();

        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            rt.block_on(async {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                mock_server::run(listener).await
            })
            .unwrap();
        });

        addr
    }

    extern "C" fn collect(data: *const u8, len: usize, user_data: *mut c_void) -> bool {
        let out = unsafe { &mut *(user_data as *mut Vec<u8>) };
        out.extend_from_slice(unsafe { std::slice::from_raw_parts(data, len) });
        true
    }

    extern "C" fn reject(_data: *const u8, _len: usize, _user_data: *mut c_void) -> bool {
        false
    }

    fn c_str<'a>(s: *const c_char) -> &'a str {
        unsafe { CStr::from_ptr(s) }.to_str().unwrap()
    }

    #[test]
    fn init_reports_ok() {
        assert_eq!(fetch_init(), FfiErrorCode::Ok);
        assert_eq!(fetch_init(), FfiErrorCode::Ok);
    }

    #[test]
    fn client_new_and_free() {
        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        assert!(!client.is_null());
        fetch_client_free(client);
    }

    #[test]
    fn client_new_with_options() {
        let json = CString::new(r#"{"buffer_size": 512, "timeouts": {"connect_ms": 2000}}"#).unwrap();
        let client = fetch_client_new(json.as_ptr(), std::ptr::null_mut());
        assert!(!client.is_null());
        let options = unsafe { &*client }.inner.options();
        assert_eq!(options.buffer_size, 512);
        assert_eq!(options.timeouts.connect_ms, Some(2000));
        fetch_client_free(client);
    }

    #[test]
    fn client_new_rejects_bad_options() {
        let unknown = CString::new(r#"{"retries": 3}"#).unwrap();
        let mut message: *mut c_char = std::ptr::null_mut();
        assert!(fetch_client_new(unknown.as_ptr(), &mut message).is_null());
        assert!(!message.is_null());
        assert!(c_str(message).contains("unknown field"), "{}", c_str(message));
        fetch_free_string(message);

        let zero = CString::new(r#"{"buffer_size": 0}"#).unwrap();
        let mut message: *mut c_char = std::ptr::null_mut();
        assert!(fetch_client_new(zero.as_ptr(), &mut message).is_null());
        assert!(c_str(message).contains("buffer_size"), "{}", c_str(message));
        fetch_free_string(message);

        assert!(fetch_client_new(zero.as_ptr(), std::ptr::null_mut()).is_null());
    }

    #[test]
    fn client_new_clears_error_message_on_success() {
        let mut message: *mut c_char = std::ptr::NonNull::dangling().as_ptr();
        let client = fetch_client_new(std::ptr::null(), &mut message);
        assert!(!client.is_null());
        assert!(message.is_null());
        fetch_client_free(client);
    }

    #[test]
    fn client_free_null_is_safe() {
        fetch_client_free(std::ptr::null_mut());
    }

    #[test]
    fn parse_url_success() {
        let url = CString::new("HTTPS://example.com:8443/a?b=c").unwrap();
        let result = fetch_parse_url(url.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert!(r.error_message.is_null());
        assert!(matches!(r.data_tag, FfiDataTag::ParsedUrl));

        let parsed = unsafe { &*(r.data as *const FfiParsedUrl) };
        assert!(matches!(parsed.scheme, FfiScheme::Https));
        assert_eq!(c_str(parsed.host), "example.com");
        assert_eq!(parsed.port, 8443);
        assert_eq!(c_str(parsed.path), "/a?b=c");

        fetch_free_result(result);
    }

    #[test]
    fn parse_url_missing_separator() {
        let url = CString::new("example.com").unwrap();
        let result = fetch_parse_url(url.as_ptr());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::MalformedUrl);
        assert!(!r.error_message.is_null());
        assert!(r.data.is_null());
        fetch_free_result(result);
    }

    #[test]
    fn parse_url_bad_port() {
        let url = CString::new("http://example.com:99999/").unwrap();
        let result = fetch_parse_url(url.as_ptr());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::InvalidPort);
        fetch_free_result(result);
    }

    #[test]
    fn parse_url_null_returns_null_arg() {
        let result = fetch_parse_url(std::ptr::null());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::NullArg);
        assert_eq!(c_str(r.error_message), "null argument: url");
        fetch_free_result(result);
    }

    #[test]
    fn build_request_returns_template_bytes() {
        let url = CString::new("http://localhost:3000/").unwrap();
        let buffer = fetch_build_request(url.as_ptr());
        assert!(!buffer.is_null());

        let b = unsafe { &*buffer };
        let bytes = unsafe { std::slice::from_raw_parts(b.data, b.len) };
        assert_eq!(
            bytes,
            b"GET / HTTP/1.0\r\nHost: localhost:3000\r\nConnection: close\r\n\r\n"
        );
        fetch_free_buffer(buffer);
    }

    #[test]
    fn build_request_invalid_url_returns_null() {
        let url = CString::new("ftp://example.com/").unwrap();
        assert!(fetch_build_request(url.as_ptr()).is_null());
        assert!(fetch_build_request(std::ptr::null()).is_null());
    }

    #[test]
    fn fetch_url_streams_to_callback() {
        let addr = start_mock_server();
        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        let url = CString::new(format!("http://{addr}/large?size=10000")).unwrap();

        let mut received: Vec<u8> = Vec::new();
        let result = fetch_url(
            client,
            url.as_ptr(),
            Some(collect),
            &mut received as *mut Vec<u8> as *mut c_void,
        );
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        assert!(matches!(r.data_tag, FfiDataTag::Report));

        let report = unsafe { &*(r.data as *const FfiFetchReport) };
        assert!(!report.tls);
        assert_eq!(report.port, addr.port());
        assert_eq!(c_str(report.address), "127.0.0.1");
        assert!(report.peer_certificate_subject.is_null());
        assert_eq!(report.bytes_received, received.len() as u64);
        assert!(received.ends_with(&mock_server::large_body(10_000)));

        fetch_free_result(result);
        fetch_client_free(client);
    }

    #[test]
    fn fetch_url_without_callback_discards_body() {
        let addr = start_mock_server();
        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        let url = CString::new(format!("http://{addr}/")).unwrap();

        let result = fetch_url(client, url.as_ptr(), None, std::ptr::null_mut());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::Ok);
        let report = unsafe { &*(r.data as *const FfiFetchReport) };
        assert!(report.bytes_received > 0);

        fetch_free_result(result);
        fetch_client_free(client);
    }

    #[test]
    fn fetch_url_callback_rejection_is_sink_error() {
        let addr = start_mock_server();
        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        let url = CString::new(format!("http://{addr}/")).unwrap();

        let result = fetch_url(client, url.as_ptr(), Some(reject), std::ptr::null_mut());
        let r = unsafe { &*result };
        assert_eq!(r.error_code, FfiErrorCode::SinkError);
        assert!(r.data.is_null());

        fetch_free_result(result);
        fetch_client_free(client);
    }

    #[test]
    fn fetch_url_refused_connection() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        let url = CString::new(format!("http://127.0.0.1:{port}/")).unwrap();

        let result = fetch_url(client, url.as_ptr(), None, std::ptr::null_mut());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::ConnectionRefused);

        fetch_free_result(result);
        fetch_client_free(client);
    }

    #[test]
    fn fetch_url_null_args() {
        let url = CString::new("http://localhost/").unwrap();
        let result = fetch_url(std::ptr::null(), url.as_ptr(), None, std::ptr::null_mut());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        fetch_free_result(result);

        let client = fetch_client_new(std::ptr::null(), std::ptr::null_mut());
        let result = fetch_url(client, std::ptr::null(), None, std::ptr::null_mut());
        assert_eq!(unsafe { &*result }.error_code, FfiErrorCode::NullArg);
        fetch_free_result(result);
        fetch_client_free(client);
    }

    #[test]
    fn free_functions_accept_null() {
        fetch_free_result(std::ptr::null_mut());
        fetch_free_buffer(std::ptr::null_mut());
        fetch_free_string(std::ptr::null_mut());
    }
}
