//! TCP connect probe.
//!
//! Sockets are created through socket2 so they can be configured before the
//! connect is issued: no Nagle delay and a zero linger, so dropping the stream
//! resets the connection instead of leaving it in TIME_WAIT.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpSocket, TcpStream};

use super::ProbeError;
use crate::target::Target;

/// Run a TCP probe against the given target.
///
/// Returns the time from the connection attempt to the established event.
pub async fn run_tcp_probe(target: &Target) -> Result<Duration, ProbeError> {
    let (stream, started) = connect(target).await?;
    let elapsed = started.elapsed();
    drop(stream);
    Ok(elapsed)
}

/// Resolve and connect to the target.
///
/// Returns the open stream and the instant the connection attempt started
/// (after name resolution).
pub(crate) async fn connect(target: &Target) -> Result<(TcpStream, Instant), ProbeError> {
    let addr = resolve_address(target).await?;
    let socket = new_socket(&addr)?;

    let started = Instant::now();
    let stream = socket
        .connect(addr)
        .await
        .map_err(|e| ProbeError::Network(format!("connect to {} failed: {}", addr, e)))?;

    Ok((stream, started))
}

/// Resolve hostname to a socket address.
async fn resolve_address(target: &Target) -> Result<SocketAddr, ProbeError> {
    // Try direct parse first
    if let Ok(ip) = target.host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, target.port));
    }

    tokio::net::lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .next()
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", target.host)))
}

fn new_socket(addr: &SocketAddr) -> Result<TcpSocket, ProbeError> {
    let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ProbeError::Network(format!("Failed to create socket: {}", e)))?;

    socket
        .set_nonblocking(true)
        .map_err(|e| ProbeError::Network(format!("Failed to set nonblocking: {}", e)))?;
    socket
        .set_nodelay(true)
        .map_err(|e| ProbeError::Network(format!("Failed to set nodelay: {}", e)))?;
    socket
        .set_linger(Some(Duration::ZERO))
        .map_err(|e| ProbeError::Network(format!("Failed to set linger: {}", e)))?;

    let std_stream: std::net::TcpStream = socket.into();
    Ok(TcpSocket::from_std_stream(std_stream))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_probe_connects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let target = Target::parse(&addr.to_string(), 80).unwrap();

        let latency = run_tcp_probe(&target).await.unwrap();
        assert!(latency < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let target = Target::parse(&addr.to_string(), 80).unwrap();

        let result = run_tcp_probe(&target).await;
        assert!(matches!(result, Err(ProbeError::Network(_))));
    }

    #[tokio::test]
    async fn test_tcp_probe_unresolvable_host() {
        let target = Target::parse("no-such-host.invalid:80", 80).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), run_tcp_probe(&target)).await;
        assert!(!matches!(result, Ok(Ok(_))));
    }
}
