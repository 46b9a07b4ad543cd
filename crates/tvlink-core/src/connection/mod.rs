//! Connection utilities: device address parsing and port reachability.
//!
//! A TV is identified purely by its network address. Before a session is
//! attempted the remote control port is probed with a short TCP connect so that
//! a powered-off TV or a wrong address produces a clear diagnostic instead of a
//! long TLS timeout.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Parse a device address.
///
/// Accepts a bare IP (`192.168.1.50`, `::1`), a bracketed IPv6 (`[::1]`) or an
/// `IP:PORT` pair whose port is ignored, since the protocol ports are fixed.
///
/// # Examples
///
/// ```
/// use tvlink_core::connection::parse_device_address;
///
/// let addr = parse_device_address("192.168.1.50").unwrap();
/// assert_eq!(addr.to_string(), "192.168.1.50");
///
/// let addr = parse_device_address("192.168.1.50:6466").unwrap();
/// assert_eq!(addr.to_string(), "192.168.1.50");
/// ```
///
/// # Errors
///
/// Returns an error if the host string cannot be parsed.
pub fn parse_device_address(host: &str) -> Result<IpAddr> {
    let host = host.trim();

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr.ip());
    }

    if let Some(inner) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        if let Ok(ip) = inner.parse::<IpAddr>() {
            return Ok(ip);
        }
    }

    Err(Error::InvalidAddress(format!(
        "'{host}' is not an IP address (e.g. 192.168.1.50)"
    )))
}

/// Check whether a TCP port accepts connections.
///
/// Returns `true` only if the connect succeeds within `limit`. Refused
/// connections, unreachable hosts and timeouts all yield `false`; no retries
/// happen here.
pub async fn probe(address: IpAddr, port: u16, limit: Duration) -> bool {
    let target = SocketAddr::new(address, port);
    let started = Instant::now();

    let reachable = matches!(timeout(limit, TcpStream::connect(target)).await, Ok(Ok(_)));

    tracing::debug!(
        "Probe {} -> {} in {:?}",
        target,
        if reachable { "open" } else { "closed" },
        started.elapsed()
    );
    reachable
}
