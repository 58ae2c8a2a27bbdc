//! LAN discovery over UDP beacons.
//!
//! An advertising peer sends a small JSON [`Beacon`] every interval to the
//! discovery target (the broadcast address by default). A browsing peer
//! listens on the discovery port and keeps a last-seen table:
//!
//! - first beacon from a peer → [`DiscoveryEvent::Found`]
//! - a `leaving` beacon, or silence longer than the TTL → [`DiscoveryEvent::Lost`]
//!
//! Beacons with another service name or our own peer id are ignored.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use kaunwho_protocol::{Codec, JsonCodec};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{PeerId, TransportError};

const MAX_BEACON_BYTES: usize = 2048;

/// Presence announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub service: String,
    pub peer_id: PeerId,
    /// TCP port of the sender's session listener.
    pub session_port: u16,
    /// Sent once when advertising stops.
    pub leaving: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A peer started advertising. `addr` is where its session listener is.
    Found { peer: PeerId, addr: SocketAddr },
    Lost(PeerId),
}

pub(crate) fn parse_addr(addr: &str) -> Result<SocketAddr, TransportError> {
    addr.parse()
        .map_err(|_| TransportError::InvalidAddress(addr.to_owned()))
}

// ---------------------------------------------------------------------------
// Advertiser
// ---------------------------------------------------------------------------

/// Sends beacons until dropped. Dropping sends one final `leaving` beacon.
pub struct Advertiser {
    stop: Option<oneshot::Sender<()>>,
    /// Detached on drop so the `leaving` beacon still goes out.
    _task: JoinHandle<()>,
}

impl Advertiser {
    pub async fn start(
        target: SocketAddr,
        beacon: Beacon,
        interval: Duration,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(TransportError::AcceptFailed)?;
        socket
            .set_broadcast(true)
            .map_err(TransportError::AcceptFailed)?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_advertiser(socket, target, beacon, interval, stop_rx));
        Ok(Self {
            stop: Some(stop_tx),
            _task: task,
        })
    }
}

impl Drop for Advertiser {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn run_advertiser(
    socket: UdpSocket,
    target: SocketAddr,
    mut beacon: Beacon,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut warned = false;
    tracing::debug!(%target, peer = %beacon.peer_id, port = beacon.session_port, "advertising");

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => {
                if let Err(e) = send_beacon(&socket, target, &beacon).await {
                    // Usually "network unreachable" with no LAN; log once.
                    if !warned {
                        tracing::warn!(%target, error = %e, "beacon send failed");
                        warned = true;
                    }
                }
            }
        }
    }

    beacon.leaving = true;
    if let Err(e) = send_beacon(&socket, target, &beacon).await {
        tracing::debug!(error = %e, "leaving beacon not sent");
    }
    tracing::debug!(peer = %beacon.peer_id, "advertising stopped");
}

async fn send_beacon(socket: &UdpSocket, target: SocketAddr, beacon: &Beacon) -> Result<(), TransportError> {
    let bytes = JsonCodec.encode(beacon)?;
    socket
        .send_to(&bytes, target)
        .await
        .map_err(TransportError::SendFailed)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

/// Listens for beacons until dropped.
pub struct Browser {
    task: JoinHandle<()>,
}

impl Browser {
    /// Binds `bind` and starts reporting peers through `emit`.
    pub async fn start<F>(
        bind: &str,
        service: String,
        local_peer: PeerId,
        ttl: Duration,
        emit: F,
    ) -> Result<Self, TransportError>
    where
        F: Fn(DiscoveryEvent) + Send + 'static,
    {
        let socket = UdpSocket::bind(parse_addr(bind)?)
            .await
            .map_err(TransportError::AcceptFailed)?;
        let local_addr = socket.local_addr().map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%local_addr, %service, "browsing for peers");

        let table = PeerTable {
            service,
            local_peer,
            ttl,
            seen: HashMap::new(),
        };
        let task = tokio::spawn(run_browser(socket, table, emit));
        Ok(Self { task })
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_browser<F>(socket: UdpSocket, mut table: PeerTable, emit: F)
where
    F: Fn(DiscoveryEvent) + Send + 'static,
{
    let mut buf = vec![0u8; MAX_BEACON_BYTES];
    let mut prune = tokio::time::interval((table.ttl / 2).max(Duration::from_millis(50)));

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, src)) => {
                    match JsonCodec.decode::<Beacon>(&buf[..len]) {
                        Ok(beacon) => {
                            if let Some(event) = table.observe(beacon, src, Instant::now()) {
                                emit(event);
                            }
                        }
                        Err(e) => tracing::trace!(%src, error = %e, "ignoring non-beacon datagram"),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "discovery receive failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            _ = prune.tick() => {
                for event in table.prune(Instant::now()) {
                    emit(event);
                }
            }
        }
    }
}

/// Last-seen bookkeeping, separate from the socket so it can be tested
/// without one.
struct PeerTable {
    service: String,
    local_peer: PeerId,
    ttl: Duration,
    seen: HashMap<PeerId, Sighting>,
}

struct Sighting {
    addr: SocketAddr,
    last: Instant,
}

impl PeerTable {
    fn observe(&mut self, beacon: Beacon, src: SocketAddr, now: Instant) -> Option<DiscoveryEvent> {
        if beacon.service != self.service || beacon.peer_id == self.local_peer {
            return None;
        }
        if beacon.leaving {
            return self
                .seen
                .remove(&beacon.peer_id)
                .map(|_| DiscoveryEvent::Lost(beacon.peer_id));
        }
        // A peer that re-advertises on a new port is found again at the
        // new address, even if its leaving beacon never arrived.
        let addr = SocketAddr::new(src.ip(), beacon.session_port);
        match self.seen.insert(beacon.peer_id.clone(), Sighting { addr, last: now }) {
            Some(previous) if previous.addr == addr => None,
            Some(previous) => {
                tracing::debug!(peer = %beacon.peer_id, old = %previous.addr, new = %addr, "peer moved");
                Some(DiscoveryEvent::Found {
                    peer: beacon.peer_id,
                    addr,
                })
            }
            None => Some(DiscoveryEvent::Found {
                peer: beacon.peer_id,
                addr,
            }),
        }
    }

    fn prune(&mut self, now: Instant) -> Vec<DiscoveryEvent> {
        let ttl = self.ttl;
        let expired: Vec<PeerId> = self
            .seen
            .iter()
            .filter(|(_, sighting)| now.saturating_duration_since(sighting.last) > ttl)
            .map(|(peer, _)| peer.clone())
            .collect();
        for peer in &expired {
            self.seen.remove(peer);
            tracing::debug!(%peer, "peer beacon expired");
        }
        expired.into_iter().map(DiscoveryEvent::Lost).collect()
    }
}
