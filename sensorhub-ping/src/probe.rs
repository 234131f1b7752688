//! TCP connect round-trip probe.

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

use sensorhub_framework::{FetchError, Fields, PollSource};

/// Field holding the round-trip time in milliseconds.
pub const TIME_FIELD: &str = "time";

/// Measures how long a TCP handshake with the target takes.
///
/// A refused connection still means the host answered, so it counts as a
/// successful probe.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    port: u16,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, FetchError> {
        if let Ok(addr) = self.address.parse::<SocketAddr>() {
            return Ok(addr);
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        let lookup = if self.address.contains(':') {
            tokio::net::lookup_host(self.address.clone())
                .await
                .map(|mut addrs| addrs.next())
        } else {
            tokio::net::lookup_host((self.address.as_str(), self.port))
                .await
                .map(|mut addrs| addrs.next())
        };
        lookup
            .map_err(|e| FetchError::Connection(format!("{}: {}", self.address, e)))?
            .ok_or_else(|| FetchError::Connection(format!("{}: no address", self.address)))
    }
}

impl PollSource for TcpProbe {
    /// The resolved address. Resolution is redone after a failure.
    type Session = SocketAddr;

    async fn connect(&self) -> Result<SocketAddr, FetchError> {
        self.resolve().await
    }

    async fn read(&self, session: &mut SocketAddr) -> Result<Fields, FetchError> {
        let start = Instant::now();
        match TcpStream::connect(*session).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                trace!(addr = %session, "Connection refused, host is up");
            }
            Err(e) => return Err(FetchError::Connection(format!("{}: {}", session, e))),
        }
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
        Ok(Fields::new().with(TIME_FIELD, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let probe = TcpProbe::new(addr.to_string(), 80);

        let mut session = probe.connect().await.unwrap();
        assert_eq!(session, addr);

        let fields = probe.read(&mut session).await.unwrap();
        assert!(fields.get(TIME_FIELD).unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_probe_refused_counts_as_reachable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let probe = TcpProbe::new("127.0.0.1", addr.port());

        let mut session = probe.connect().await.unwrap();
        let fields = probe.read(&mut session).await.unwrap();
        assert!(fields.contains(TIME_FIELD));
    }

    #[tokio::test]
    async fn test_resolve_ip_uses_port() {
        let probe = TcpProbe::new("10.0.0.1", 8080);
        assert_eq!(
            probe.resolve().await.unwrap(),
            "10.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
    }
}
