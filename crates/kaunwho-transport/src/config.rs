//! Transport configuration.

use std::time::Duration;

use kaunwho_protocol::WireFormat;
use serde::{Deserialize, Serialize};

/// Settings for discovery and peer sessions.
///
/// Addresses are strings so they read naturally in a config file; they
/// are parsed when the sockets are bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Only peers advertising the same service name see each other.
    pub service_name: String,
    /// Where the session listener binds. Port 0 picks a free port.
    pub listen_addr: String,
    /// Where the discovery socket binds to hear beacons.
    pub discovery_bind: String,
    /// Where beacons are sent.
    pub discovery_target: String,
    pub beacon_interval_ms: u64,
    /// A discovered peer silent for this long is dropped.
    pub peer_ttl_ms: u64,
    pub connect_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    /// Connected peers beyond this count are refused.
    pub max_peers: usize,
    /// Largest encoded envelope accepted from a peer. Snapshots carry the
    /// raw photo bytes, so this has to cover two full photo pools.
    pub max_message_bytes: usize,
    pub wire_format: WireFormat,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            service_name: "kaunwho-game".into(),
            listen_addr: "0.0.0.0:0".into(),
            discovery_bind: "0.0.0.0:47474".into(),
            discovery_target: "255.255.255.255:47474".into(),
            beacon_interval_ms: 1_000,
            peer_ttl_ms: 3_500,
            connect_timeout_secs: 30,
            handshake_timeout_secs: 10,
            max_peers: 1,
            max_message_bytes: 256 << 20,
            wire_format: WireFormat::default(),
        }
    }
}

impl TransportConfig {
    pub fn beacon_interval(&self) -> Duration {
        Duration::from_millis(self.beacon_interval_ms)
    }

    pub fn peer_ttl(&self) -> Duration {
        Duration::from_millis(self.peer_ttl_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Loopback-only settings with OS-assigned ports, for tests and demos
    /// on a single machine.
    pub fn loopback() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".into(),
            discovery_bind: "127.0.0.1:0".into(),
            discovery_target: "127.0.0.1:47474".into(),
            ..Self::default()
        }
    }
}
