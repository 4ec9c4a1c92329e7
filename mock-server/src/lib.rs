use axum::{
    extract::{Path, Query},
    http::{HeaderMap, Method, StatusCode, Uri, Version},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

pub const GREETING: &str = "hello from mock-server\n";

/// Largest body `/large` will produce.
pub const MAX_LARGE_SIZE: usize = 16 * 1024 * 1024;

const DEFAULT_LARGE_SIZE: usize = 64 * 1024;

/// What the server saw for a request to `/echo`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EchoedRequest {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Deserialize)]
pub struct LargeParams {
    pub size: Option<usize>,
}

pub fn app() -> Router {
    Router::new()
        .route("/", get(greeting))
        .route("/large", get(large))
        .route("/echo", get(echo))
        .route("/status/{code}", get(status))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Deterministic body of `size` bytes cycling through `a..=z`.
pub fn large_body(size: usize) -> Vec<u8> {
    (0..size).map(|i| b'a' + (i % 26) as u8).collect()
}

async fn greeting() -> &'static str {
    GREETING
}

async fn large(Query(params): Query<LargeParams>) -> Result<Vec<u8>, StatusCode> {
    let size = params.size.unwrap_or(DEFAULT_LARGE_SIZE);
    if size > MAX_LARGE_SIZE {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(large_body(size))
}

async fn echo(method: Method, uri: Uri, version: Version, headers: HeaderMap) -> Json<EchoedRequest> {
    let headers = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(EchoedRequest {
        method: method.to_string(),
        uri: uri.to_string(),
        version: format!("{version:?}"),
        headers,
    })
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}\n")))
}
