//! UDP relay for advertisements captured by an external BLE scanner.
//!
//! Each datagram carries one advertisement as JSON:
//!
//! ```text
//! {"address": "C0:12:34:56:78:9A", "rssi": -61,
//!  "manufacturer_data": [{"company_id": 2409, "data": [194, 18, ...]}]}
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use sensorhub_framework::{AdapterError, EventSender, MacAddress, Result};

use crate::decoder::advertisement_event;

const MAX_DATAGRAM: usize = 2048;

/// One relayed advertisement.
#[derive(Debug, Clone, Deserialize)]
pub struct Advertisement {
    pub address: String,
    #[serde(default)]
    pub rssi: Option<i16>,
    #[serde(default)]
    pub manufacturer_data: Vec<ManufacturerData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManufacturerData {
    pub company_id: u16,
    pub data: Vec<u8>,
}

impl Advertisement {
    /// Parse a datagram. Returns `None` for anything that is not a
    /// well-formed advertisement.
    pub fn parse(datagram: &[u8]) -> Option<Self> {
        serde_json::from_slice(datagram).ok()
    }

    fn publish(self, sender: &EventSender) -> bool {
        let Ok(address) = self.address.parse::<MacAddress>() else {
            return false;
        };
        let data: HashMap<u16, Vec<u8>> = self
            .manufacturer_data
            .into_iter()
            .map(|m| (m.company_id, m.data))
            .collect();
        match advertisement_event(address, self.rssi, &data) {
            Some(event) => sender.publish(event),
            None => false,
        }
    }
}

/// Bind the relay socket.
pub async fn bind(addr: &str) -> Result<UdpSocket> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| AdapterError::validation(format!("switchbot: listen '{}': {}", addr, e)))?;
    UdpSocket::bind(addr)
        .await
        .map_err(|e| AdapterError::with_context(format!("Failed to bind UDP socket to {}", addr), e))
}

/// Forward datagrams from `socket` to `sender` until shutdown.
pub async fn run(socket: UdpSocket, sender: EventSender, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = socket.local_addr() {
        tracing::info!(addr = %addr, "Advertisement relay listening");
    }
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => match Advertisement::parse(&buf[..len]) {
                    Some(advertisement) => {
                        advertisement.publish(&sender);
                    }
                    None => tracing::debug!(peer = %peer, "Ignoring malformed advertisement datagram"),
                },
                Err(e) => tracing::warn!(error = %e, "UDP receive error"),
            },
        }
    }
    tracing::info!("Advertisement relay stopped");
}

/// Wait for a spawned relay to finish. Returns `false` if it panicked or
/// was cancelled.
pub async fn join(relay: JoinHandle<()>) -> bool {
    match relay.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Advertisement relay aborted");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_reports_aborted_relay() {
        let clean = tokio::spawn(async {});
        assert!(join(clean).await);

        let panicked: JoinHandle<()> = tokio::spawn(async { panic!("relay task failed") });
        assert!(!join(panicked).await);
    }

    #[test]
    fn test_parse_advertisement() {
        let adv = Advertisement::parse(
            br#"{"address":"C0:12:34:56:78:9A","rssi":-61,"manufacturer_data":[{"company_id":2409,"data":[1,2]}]}"#,
        )
        .unwrap();
        assert_eq!(adv.rssi, Some(-61));
        assert_eq!(adv.manufacturer_data[0].company_id, 0x0969);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Advertisement::parse(b"not json").is_none());
        assert!(Advertisement::parse(br#"{"rssi":-61}"#).is_none());
    }
}
