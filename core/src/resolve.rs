//! Hostname resolution adapter.
//!
//! Resolution itself is delegated to the platform resolver through
//! `ToSocketAddrs`. Every fetch resolves fresh: no caching, no retries.

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use crate::error::FetchError;

/// An address resolved for `host`, valid for a single connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    host: String,
    ip: IpAddr,
}

impl NetworkAddress {
    pub fn new(host: impl Into<String>, ip: IpAddr) -> Self {
        Self {
            host: host.into(),
            ip,
        }
    }

    /// The hostname this address was resolved from.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.ip, port)
    }
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.host, self.ip)
    }
}

/// Turns a hostname into a [`NetworkAddress`].
pub trait Resolve {
    fn resolve(&self, host: &str) -> Result<NetworkAddress, FetchError>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
///
/// IPv4 answers are preferred when both families are returned, matching
/// the `gethostbyname` behaviour callers of this crate usually expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str) -> Result<NetworkAddress, FetchError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(NetworkAddress::new(host, ip));
        }

        let addrs: Vec<SocketAddr> = (host, 0)
            .to_socket_addrs()
            .map_err(|e| FetchError::UnresolvedHost {
                host: host.to_string(),
                reason: e.to_string(),
            })?
            .collect();

        let chosen = addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .ok_or_else(|| FetchError::UnresolvedHost {
                host: host.to_string(),
                reason: "no address records".to_string(),
            })?;

        log::debug!("resolved {host} to {} ({} candidates)", chosen.ip(), addrs.len());
        Ok(NetworkAddress::new(host, chosen.ip()))
    }
}

/// Resolve `host` with the [`SystemResolver`].
pub fn resolve(host: &str) -> Result<NetworkAddress, FetchError> {
    SystemResolver.resolve(host)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn ip_literals_skip_lookup() {
        let addr = resolve("127.0.0.1").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.host(), "127.0.0.1");

        let addr = resolve("::1").unwrap();
        assert_eq!(addr.ip(), IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn localhost_resolves() {
        let addr = resolve("localhost").unwrap();
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn reserved_tld_is_unresolved() {
        let err = resolve("no-such-host.invalid").unwrap_err();
        assert!(matches!(err, FetchError::UnresolvedHost { host, .. } if host == "no-such-host.invalid"));
    }

    #[test]
    fn socket_addr_pairs_ip_with_port() {
        let addr = NetworkAddress::new("example.com", IpAddr::V4(Ipv4Addr::new(93, 184, 215, 14)));
        assert_eq!(addr.socket_addr(443).to_string(), "93.184.215.14:443");
        assert_eq!(addr.to_string(), "example.com [93.184.215.14]");
    }
}
