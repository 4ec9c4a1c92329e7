//! URL decomposition into scheme, host, port and path.
//!
//! Only `http` and `https` are recognised. The decomposer runs before any
//! I/O, so every string it returns is free of whitespace and control
//! characters and can be placed into a request line verbatim.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Transport flavour selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn is_tls(self) -> bool {
        matches!(self, Scheme::Https)
    }
}

impl FromStr for Scheme {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("http") {
            Ok(Scheme::Http)
        } else if s.eq_ignore_ascii_case("https") {
            Ok(Scheme::Https)
        } else {
            Err(FetchError::MalformedUrl(format!("unsupported scheme {s:?}")))
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decomposed URL. Built once by [`parse`] and never mutated.
///
/// `host` is non-empty and holds IPv6 literals without brackets; `port` is
/// never zero; `path` always starts with `/`. Deserialising checks the same
/// invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawParsedUrl")]
pub struct ParsedUrl {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl ParsedUrl {
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Value for the `Host` request header: brackets around IPv6 literals,
    /// and the port only when it differs from the scheme default.
    pub fn host_header(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        if self.port == self.scheme.default_port() {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParsedUrl {
    scheme: Scheme,
    host: String,
    port: u16,
    path: String,
}

impl TryFrom<RawParsedUrl> for ParsedUrl {
    type Error = FetchError;

    fn try_from(raw: RawParsedUrl) -> Result<Self, Self::Error> {
        let unsafe_char = |c: char| c.is_whitespace() || c.is_control();
        if raw.host.is_empty()
            || raw.host.contains(unsafe_char)
            || raw.host.contains(['/', '?', '#', '@'])
        {
            return Err(FetchError::MalformedUrl(format!("invalid host {:?}", raw.host)));
        }
        if raw.host.contains(':') && raw.host.parse::<Ipv6Addr>().is_err() {
            return Err(FetchError::MalformedUrl(format!("invalid IPv6 literal {:?}", raw.host)));
        }
        if raw.port == 0 {
            return Err(FetchError::InvalidPort("0".to_string()));
        }
        if !raw.path.starts_with('/') || raw.path.contains(unsafe_char) || raw.path.contains('#') {
            return Err(FetchError::MalformedUrl(format!("invalid path {:?}", raw.path)));
        }
        Ok(ParsedUrl {
            scheme: raw.scheme,
            host: raw.host,
            port: raw.port,
            path: raw.path,
        })
    }
}

/// Renders a URL that [`parse`] decomposes back into the same value. A path
/// ending in `/` gets one extra `/` to survive the trailing-slash strip.
impl fmt::Display for ParsedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}{}", self.scheme, self.host, self.port, self.path)?;
        } else {
            write!(f, "{}://{}:{}{}", self.scheme, self.host, self.port, self.path)?;
        }
        if self.path.len() > 1 && self.path.ends_with('/') {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl FromStr for ParsedUrl {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Decompose `url` into a [`ParsedUrl`].
///
/// A single trailing `/` is stripped before anything else. Fails with
/// `MalformedUrl` when `://` is missing, the scheme is unknown, or the host
/// is empty, and with `InvalidPort` when an explicit port is not a decimal
/// number in `1..=65535`.
pub fn parse(url: &str) -> Result<ParsedUrl, FetchError> {
    if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(FetchError::MalformedUrl(url.escape_debug().to_string()));
    }

    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| FetchError::MalformedUrl(format!("{url} (missing \"://\")")))?;
    let scheme: Scheme = scheme.parse()?;

    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);
    let (authority, path) = match rest.find(['/', '?']) {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    if authority.contains('@') {
        return Err(FetchError::MalformedUrl(format!("{url} (userinfo is not supported)")));
    }

    let (host, port) = split_authority(authority, scheme)?;
    if host.is_empty() {
        return Err(FetchError::MalformedUrl(format!("{url} (empty host)")));
    }

    let path = if path.is_empty() {
        "/".to_string()
    } else if path.starts_with('?') {
        format!("/{path}")
    } else {
        path.to_string()
    };

    Ok(ParsedUrl {
        scheme,
        host: host.to_string(),
        port,
        path,
    })
}

fn split_authority(authority: &str, scheme: Scheme) -> Result<(&str, u16), FetchError> {
    if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, tail) = bracketed
            .split_once(']')
            .ok_or_else(|| FetchError::MalformedUrl(format!("unterminated IPv6 literal in {authority}")))?;
        if host.parse::<Ipv6Addr>().is_err() {
            return Err(FetchError::MalformedUrl(format!("invalid IPv6 literal [{host}]")));
        }
        let port = match tail {
            "" => scheme.default_port(),
            tail => match tail.strip_prefix(':') {
                Some(port) => parse_port(port)?,
                None => {
                    return Err(FetchError::MalformedUrl(format!(
                        "unexpected {tail:?} after IPv6 literal"
                    )))
                }
            },
        };
        return Ok((host, port));
    }

    match authority.split_once(':') {
        Some((host, port)) => Ok((host, parse_port(port)?)),
        None => Ok((authority, scheme.default_port())),
    }
}

fn parse_port(s: &str) -> Result<u16, FetchError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FetchError::InvalidPort(s.to_string()));
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(FetchError::InvalidPort(s.to_string())),
        Ok(port) => Ok(port),
    }
}
