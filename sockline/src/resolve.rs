use crate::error::{Error, Result};

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};

/// Resolves `host` to an IPv4 address.
///
/// A dotted-quad literal is returned as is. Otherwise the platform resolver
/// is asked and its first IPv4 answer is returned.
///
/// # Errors
///
/// [`Error::Resolve`] if the lookup fails or yields no IPv4 address.
pub fn resolve(host: &str) -> Result<Ipv4Addr> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip);
    }

    let addrs = (host, 0).to_socket_addrs().map_err(|e| {
        tracing::debug!(host, error = %e, "hostname lookup failed");
        Error::Resolve {
            host: host.to_string(),
            source: Some(e),
        }
    })?;

    addrs
        .filter_map(|addr| match addr {
            SocketAddr::V4(v4) => Some(*v4.ip()),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| Error::Resolve {
            host: host.to_string(),
            source: None,
        })
}
