//! Blocking TCP connections for unicast discovery.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::constraints::DiscoveryConstraints;
use crate::core::DEFAULT_SOCKET_TIMEOUT;

/// Connect to a lookup service, honoring the constrained deadline and
/// socket timeout.
///
/// Fails with [`io::ErrorKind::TimedOut`] if the deadline is already past at
/// `now`. A zero socket timeout leaves reads and writes unbounded.
pub fn connect_unicast(
    addr: SocketAddr,
    constraints: &DiscoveryConstraints,
    now: SystemTime,
) -> io::Result<TcpStream> {
    let stream = if constraints.has_connection_deadline() {
        let deadline = constraints.connection_deadline(now);
        let remaining = deadline
            .duration_since(now)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| io::Error::new(io::ErrorKind::TimedOut, "connection deadline passed"))?;
        debug!(%addr, ?remaining, "connecting with deadline");
        TcpStream::connect_timeout(&addr, remaining)?
    } else {
        debug!(%addr, "connecting");
        TcpStream::connect(addr)?
    };

    let timeout = Some(constraints.socket_timeout(DEFAULT_SOCKET_TIMEOUT)).filter(|d| !d.is_zero());
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Remaining time before the constrained deadline, if one was set.
pub fn time_remaining(constraints: &DiscoveryConstraints, now: SystemTime) -> Option<Duration> {
    constraints
        .has_connection_deadline()
        .then(|| {
            constraints
                .connection_deadline(now)
                .duration_since(now)
                .unwrap_or(Duration::ZERO)
        })
}
