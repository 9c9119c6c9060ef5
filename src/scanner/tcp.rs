use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::scanner::results::{PortState, ProbeResult};
use crate::scanner::Prober;

/// Full TCP handshake per port. Each probe opens its own socket and
/// drops it as soon as the outcome is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnectProber;

#[async_trait]
impl Prober for TcpConnectProber {
    async fn probe(&self, target: IpAddr, port: u16, limit: Duration) -> ProbeResult {
        connect_scan(target, port, limit).await
    }
}

pub async fn connect_scan(target: IpAddr, port: u16, limit: Duration) -> ProbeResult {
    let addr = SocketAddr::new(target, port);
    let started = Instant::now();

    let outcome = timeout(limit, TcpStream::connect(addr)).await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeResult::new(port, PortState::Open).with_latency(latency_ms)
        }
        Ok(Err(e)) => match classify_error(e.kind()) {
            PortState::Error => ProbeResult::error(port, e.to_string()),
            state => ProbeResult::new(port, state).with_latency(latency_ms),
        },
        // No answer inside the window
        Err(_) => ProbeResult::new(port, PortState::Filtered),
    }
}

/// Map a failed connect to a port state. Refusal means something answered
/// with RST; an OS-level timeout is the same as our own timer firing.
pub fn classify_error(kind: ErrorKind) -> PortState {
    match kind {
        ErrorKind::ConnectionRefused => PortState::Closed,
        ErrorKind::TimedOut => PortState::Filtered,
        _ => PortState::Error,
    }
}
