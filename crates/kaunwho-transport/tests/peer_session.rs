//! End-to-end tests for peer sessions on the loopback interface.
//!
//! Each test runs real sockets: a TCP listener for sessions and, for
//! discovery, a UDP port picked per test so parallel runs do not collide.

use std::net::SocketAddr;
use std::time::Duration;

use kaunwho_protocol::{Envelope, MessageType};
use kaunwho_transport::{PeerChange, PeerId, PeerTransport, Recipient, TransportConfig};

const WAIT: Duration = Duration::from_secs(5);

fn transport(name: &str) -> PeerTransport {
    PeerTransport::new(TransportConfig::loopback(), PeerId::generate(name))
}

/// Pumps `t` until `done` holds, failing the test after [`WAIT`].
async fn pump_until(t: &mut PeerTransport, mut done: impl FnMut(&mut PeerTransport) -> bool) {
    tokio::time::timeout(WAIT, async {
        loop {
            t.pump();
            if done(t) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Pumps both sides until each reports a connected peer.
async fn pump_both_connected(a: &mut PeerTransport, b: &mut PeerTransport) {
    tokio::time::timeout(WAIT, async {
        loop {
            a.pump();
            b.pump();
            if a.is_connected() && b.is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("peers did not connect in time");
}

async fn connected_pair() -> (PeerTransport, PeerTransport) {
    let mut host = transport("Ava");
    let mut guest = transport("Ben");
    let addr = host.start_advertising().await.unwrap();
    guest.connect_addr(addr);
    pump_both_connected(&mut host, &mut guest).await;
    (host, guest)
}

fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap().port()
}

// =========================================================================
// Sessions
// =========================================================================

#[tokio::test]
async fn test_connect_addr_links_both_sides() {
    let (host, guest) = connected_pair().await;

    assert_eq!(host.state().connected_peers, vec![guest.local_peer().clone()]);
    assert_eq!(guest.state().connected_peers, vec![host.local_peer().clone()]);
    assert!(host.state().is_advertising);
    assert!(host.state().listen_addr.is_some());
}

#[tokio::test]
async fn test_send_reaches_peer_inbox_both_directions() {
    let (mut host, mut guest) = connected_pair().await;

    let envelope = Envelope::new(MessageType::JoinRequest, Some(b"Ben".to_vec()));
    guest.send(&envelope, &Recipient::AllConnected);
    let mut received = None;
    pump_until(&mut host, |t| {
        received = t.take_inbound();
        received.is_some()
    })
    .await;
    assert_eq!(received, Some(envelope));

    let reply = Envelope::signal(MessageType::JoinAccepted);
    host.send(&reply, &Recipient::Peer(guest.local_peer().clone()));
    let mut received = None;
    pump_until(&mut guest, |t| {
        received = t.take_inbound();
        received.is_some()
    })
    .await;
    assert_eq!(received.map(|e| e.kind), Some(MessageType::JoinAccepted));
}

#[tokio::test]
async fn test_inbox_keeps_only_latest_envelope() {
    let (mut host, guest) = connected_pair().await;

    for kind in [MessageType::PhotoUpdate, MessageType::EliminationUpdate, MessageType::GameOver] {
        guest.send(&Envelope::signal(kind), &Recipient::AllConnected);
    }
    // Let all three land before a single pump drains them.
    tokio::time::sleep(Duration::from_millis(300)).await;
    host.pump();

    assert_eq!(host.take_inbound().map(|e| e.kind), Some(MessageType::GameOver));
    assert_eq!(host.take_inbound(), None);
}

#[tokio::test]
async fn test_send_photo_sized_snapshot_arrives_intact() {
    let (mut host, mut guest) = connected_pair().await;

    // Sixteen pooled photos plus a fifteen-photo board at ~600 KB each,
    // past the WebSocket library's default frame limit.
    let payload = vec![7u8; 31 * 600 * 1024];
    let envelope = Envelope::new(MessageType::GameStateUpdate, Some(payload));
    host.send(&envelope, &Recipient::AllConnected);

    let received = tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            guest.pump();
            if let Some(envelope) = guest.take_inbound() {
                return envelope;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("snapshot not delivered");

    assert_eq!(received, envelope);
    host.pump();
    assert!(host.is_connected());
    assert!(guest.is_connected());
}

#[tokio::test]
async fn test_send_without_peers_is_dropped_quietly() {
    let mut lonely = transport("Ava");
    lonely.send(&Envelope::signal(MessageType::GuessAttempt), &Recipient::AllConnected);
    lonely.pump();
    assert!(!lonely.is_connected());
    assert_eq!(lonely.take_inbound(), None);
}

#[tokio::test]
async fn test_second_guest_refused_when_peer_limit_reached() {
    let (mut host, _guest) = connected_pair().await;
    let addr = host.state().listen_addr.unwrap();

    let mut late = transport("Cleo");
    late.connect_addr(addr);
    tokio::time::sleep(Duration::from_millis(300)).await;
    host.pump();

    assert_eq!(host.state().connected_peers.len(), 1);
    assert!(!host.state().connected_peers.contains(late.local_peer()));
}

#[tokio::test]
async fn test_service_mismatch_never_connects() {
    let mut host = transport("Ava");
    let mut guest = PeerTransport::new(
        TransportConfig {
            service_name: "other-game".into(),
            ..TransportConfig::loopback()
        },
        PeerId::generate("Ben"),
    );
    let addr = host.start_advertising().await.unwrap();
    guest.connect_addr(addr);

    tokio::time::sleep(Duration::from_millis(300)).await;
    host.pump();
    guest.pump();
    assert!(!host.is_connected());
    assert!(!guest.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_to_silent_listener_gives_up_quietly() {
    // Completes TCP through the backlog but never answers the upgrade.
    let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut guest = transport("Ben");
    guest.connect_addr(silent.local_addr().unwrap());

    tokio::time::sleep(guest.config().connect_timeout() + Duration::from_secs(1)).await;

    assert!(guest.pump().is_empty());
    assert!(!guest.is_connected());
    assert!(guest.state().connected_peers.is_empty());
}

#[tokio::test]
async fn test_connect_to_undiscovered_peer_errors() {
    let mut guest = transport("Ben");
    let result = guest.connect(&PeerId::from("Ghost#00000000"));
    assert!(result.is_err());
}

// =========================================================================
// Teardown
// =========================================================================

#[tokio::test]
async fn test_disconnect_resets_state_and_remote_notices() {
    let (mut host, mut guest) = connected_pair().await;
    let host_id = host.local_peer().clone();

    host.disconnect();
    let state = host.state();
    assert!(!state.is_advertising);
    assert!(!state.is_discovering);
    assert!(state.connected_peers.is_empty());
    assert!(state.discovered_peers.is_empty());
    assert_eq!(state.listen_addr, None);

    let mut changes = Vec::new();
    tokio::time::timeout(WAIT, async {
        loop {
            changes.extend(guest.pump());
            if !guest.is_connected() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("guest did not notice the disconnect");
    assert_eq!(changes, vec![PeerChange::Disconnected(host_id)]);
}

#[tokio::test]
async fn test_disconnect_when_idle_is_harmless() {
    let mut t = transport("Ava");
    t.disconnect();
    t.disconnect();
    assert_eq!(t.state().connected_peers, Vec::<PeerId>::new());
}

#[tokio::test]
async fn test_subscribers_see_connection() {
    let mut host = transport("Ava");
    let mut watcher = host.subscribe();
    let mut guest = transport("Ben");
    let addr = host.start_advertising().await.unwrap();
    guest.connect_addr(addr);
    pump_both_connected(&mut host, &mut guest).await;

    assert!(watcher.has_changed().unwrap());
    assert!(watcher.borrow_and_update().is_connected());
}

// =========================================================================
// Discovery
// =========================================================================

#[tokio::test]
async fn test_discovery_finds_advertiser_then_loses_it() {
    let port = free_udp_port();
    let beacon_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let mut host = PeerTransport::new(
        TransportConfig {
            discovery_target: beacon_addr.to_string(),
            beacon_interval_ms: 50,
            ..TransportConfig::loopback()
        },
        PeerId::generate("Ava"),
    );
    let mut guest = PeerTransport::new(
        TransportConfig {
            discovery_bind: beacon_addr.to_string(),
            ..TransportConfig::loopback()
        },
        PeerId::generate("Ben"),
    );
    let host_id = host.local_peer().clone();

    guest.start_discovery().await.unwrap();
    host.start_advertising().await.unwrap();
    pump_until(&mut guest, |t| t.discovered_peers().any(|p| *p == host_id)).await;

    guest.connect(&host_id).unwrap();
    pump_both_connected(&mut host, &mut guest).await;

    host.stop_advertising();
    pump_until(&mut guest, |t| t.discovered_peers().next().is_none()).await;
    assert!(!host.state().is_advertising);
}

#[tokio::test]
async fn test_stop_discovery_forgets_peers() {
    let mut guest = transport("Ben");
    guest.start_discovery().await.unwrap();
    assert!(guest.state().is_discovering);

    guest.stop_discovery();
    let state = guest.state();
    assert!(!state.is_discovering);
    assert!(state.discovered_peers.is_empty());
}
