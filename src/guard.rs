//! Startup check for an already-running collector.
//!
//! Tooling launches the collector opportunistically, so finding the port
//! taken means "someone already started one" and the new process should
//! exit cleanly instead of failing to bind.

use std::io;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStatus {
    /// Nothing is listening; the probe bound and released the port.
    Available,
    /// The port is taken, presumably by another collector.
    InUse,
}

/// Bind `addr` briefly and release it.
///
/// `AddrInUse` maps to [`PortStatus::InUse`]. Any other failure (for example
/// permission denied on a privileged port) is returned as an error.
pub async fn probe(addr: SocketAddr) -> io::Result<PortStatus> {
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(PortStatus::Available)
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => Ok(PortStatus::InUse),
        Err(e) => Err(e),
    }
}
