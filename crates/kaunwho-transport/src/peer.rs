//! The owner-side peer transport.
//!
//! [`PeerTransport`] is owned by exactly one task (the controller). All
//! network work happens on background tasks that post [`Event`]s into a
//! channel; the owner applies them in [`PeerTransport::pump`]. That makes
//! the owner the single writer of every observable field.
//!
//! Every event carries the epoch it was produced in. [`disconnect`]
//! bumps the epoch, so late events from torn-down tasks are ignored
//! instead of resurrecting peers.
//!
//! Inbound sessions are accepted automatically once the hello succeeds.
//!
//! [`disconnect`]: PeerTransport::disconnect

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kaunwho_protocol::{Codec, Envelope, WireFormat};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::discovery::{Advertiser, Beacon, Browser, DiscoveryEvent, parse_addr};
use crate::{
    Connection, ConnectionId, PeerId, SecureConnection, Side, TransportConfig, TransportError,
    WebSocketConnection, WebSocketListener,
};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Who a send goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    AllConnected,
    Peer(PeerId),
}

/// A change in the connected-peer set, reported by [`PeerTransport::pump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerChange {
    Connected(PeerId),
    Disconnected(PeerId),
}

/// Observable transport state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportState {
    pub local_peer: PeerId,
    pub is_advertising: bool,
    pub is_discovering: bool,
    /// Address of the session listener while advertising.
    pub listen_addr: Option<SocketAddr>,
    pub connected_peers: Vec<PeerId>,
    pub discovered_peers: Vec<PeerId>,
}

impl TransportState {
    fn idle(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            is_advertising: false,
            is_discovering: false,
            listen_addr: None,
            connected_peers: Vec::new(),
            discovered_peers: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.connected_peers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Events from background tasks
// ---------------------------------------------------------------------------

enum Event {
    Discovery(DiscoveryEvent),
    Connected(Arc<SecureConnection>),
    ConnectFailed {
        target: SocketAddr,
        error: TransportError,
    },
    Disconnected {
        peer: PeerId,
        link: ConnectionId,
        reason: Option<String>,
    },
    Inbound {
        peer: PeerId,
        envelope: Envelope,
    },
}

#[derive(Clone)]
struct EventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, Event)>,
}

impl EventSink {
    fn emit(&self, event: Event) {
        let _ = self.tx.send((self.epoch, event));
    }
}

/// What a session needs to say in its hello.
#[derive(Clone)]
struct HelloParams {
    local_peer: PeerId,
    service: String,
    timeout: Duration,
    max_message_bytes: usize,
}

// ---------------------------------------------------------------------------
// Owned resources
// ---------------------------------------------------------------------------

struct Link {
    id: ConnectionId,
    /// Dropping the sender ends the writer task, which closes the socket.
    writer: mpsc::UnboundedSender<Vec<u8>>,
    reader: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

struct Listening {
    addr: SocketAddr,
    accept_task: JoinHandle<()>,
    _advertiser: Option<Advertiser>,
}

impl Drop for Listening {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

// ---------------------------------------------------------------------------
// PeerTransport
// ---------------------------------------------------------------------------

pub struct PeerTransport {
    config: TransportConfig,
    local_peer: PeerId,
    codec: WireFormat,
    epoch: u64,
    events_tx: mpsc::UnboundedSender<(u64, Event)>,
    events_rx: mpsc::UnboundedReceiver<(u64, Event)>,
    listening: Option<Listening>,
    browser: Option<Browser>,
    dials: Vec<JoinHandle<()>>,
    links: BTreeMap<PeerId, Link>,
    discovered: BTreeMap<PeerId, SocketAddr>,
    inbox: Option<Envelope>,
    state: watch::Sender<TransportState>,
}

impl PeerTransport {
    pub fn new(config: TransportConfig, local_peer: PeerId) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(TransportState::idle(local_peer.clone()));
        Self {
            codec: config.wire_format,
            config,
            local_peer,
            epoch: 0,
            events_tx,
            events_rx,
            listening: None,
            browser: None,
            dials: Vec::new(),
            links: BTreeMap::new(),
            discovered: BTreeMap::new(),
            inbox: None,
            state,
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local_peer
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn subscribe(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> TransportState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        !self.links.is_empty()
    }

    pub fn is_advertising(&self) -> bool {
        self.listening.is_some()
    }

    pub fn is_discovering(&self) -> bool {
        self.browser.is_some()
    }

    pub fn connected_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.links.keys()
    }

    pub fn discovered_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.discovered.keys()
    }

    fn sink(&self) -> EventSink {
        EventSink {
            epoch: self.epoch,
            tx: self.events_tx.clone(),
        }
    }

    fn hello_params(&self) -> HelloParams {
        HelloParams {
            local_peer: self.local_peer.clone(),
            service: self.config.service_name.clone(),
            timeout: self.config.handshake_timeout(),
            max_message_bytes: self.config.max_message_bytes,
        }
    }

    fn publish(&self) {
        let next = TransportState {
            local_peer: self.local_peer.clone(),
            is_advertising: self.listening.is_some(),
            is_discovering: self.browser.is_some(),
            listen_addr: self.listening.as_ref().map(|l| l.addr),
            connected_peers: self.links.keys().cloned().collect(),
            discovered_peers: self.discovered.keys().cloned().collect(),
        };
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    // -- Advertising --

    /// Starts the session listener and beacons. Returns the listener
    /// address. Calling it again while advertising returns the same
    /// address.
    ///
    /// A beacon socket that cannot be opened is logged and skipped; the
    /// listener still accepts sessions dialed by address.
    pub async fn start_advertising(&mut self) -> Result<SocketAddr, TransportError> {
        if let Some(listening) = &self.listening {
            return Ok(listening.addr);
        }

        let listener = WebSocketListener::bind(&self.config.listen_addr).await?;
        let addr = listener.local_addr();
        let accept_task = tokio::spawn(accept_loop(listener, self.sink(), self.hello_params()));

        let beacon = Beacon {
            service: self.config.service_name.clone(),
            peer_id: self.local_peer.clone(),
            session_port: addr.port(),
            leaving: false,
        };
        let advertiser = match parse_addr(&self.config.discovery_target) {
            Ok(target) => Advertiser::start(target, beacon, self.config.beacon_interval())
                .await
                .map_err(|e| tracing::warn!(error = %e, "beacons disabled"))
                .ok(),
            Err(e) => {
                tracing::warn!(error = %e, "beacons disabled");
                None
            }
        };

        self.listening = Some(Listening {
            addr,
            accept_task,
            _advertiser: advertiser,
        });
        tracing::info!(peer = %self.local_peer, %addr, "advertising");
        self.publish();
        Ok(addr)
    }

    pub fn stop_advertising(&mut self) {
        if self.listening.take().is_some() {
            tracing::info!(peer = %self.local_peer, "advertising stopped");
            self.publish();
        }
    }

    // -- Discovery --

    /// Starts listening for beacons. Idempotent.
    pub async fn start_discovery(&mut self) -> Result<(), TransportError> {
        if self.browser.is_some() {
            return Ok(());
        }
        let sink = self.sink();
        let browser = Browser::start(
            &self.config.discovery_bind,
            self.config.service_name.clone(),
            self.local_peer.clone(),
            self.config.peer_ttl(),
            move |event| sink.emit(Event::Discovery(event)),
        )
        .await?;
        self.browser = Some(browser);
        tracing::info!(peer = %self.local_peer, "discovery started");
        self.publish();
        Ok(())
    }

    /// Stops listening for beacons and forgets discovered peers.
    pub fn stop_discovery(&mut self) {
        if self.browser.take().is_some() {
            self.discovered.clear();
            tracing::info!(peer = %self.local_peer, "discovery stopped");
            self.publish();
        }
    }

    // -- Connecting --

    /// Dials a discovered peer. The outcome shows up later through
    /// [`pump`](Self::pump); a failure or timeout is only logged.
    pub fn connect(&mut self, peer: &PeerId) -> Result<(), TransportError> {
        if self.links.contains_key(peer) {
            return Ok(());
        }
        let addr = *self
            .discovered
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))?;
        self.spawn_dial(addr, Some(peer.clone()));
        Ok(())
    }

    /// Dials a session listener directly, without discovery.
    pub fn connect_addr(&mut self, addr: SocketAddr) {
        self.spawn_dial(addr, None);
    }

    fn spawn_dial(&mut self, addr: SocketAddr, expected: Option<PeerId>) {
        self.dials.retain(|handle| !handle.is_finished());

        let sink = self.sink();
        let hello = self.hello_params();
        let timeout = self.config.connect_timeout();
        tracing::info!(peer = %self.local_peer, %addr, "connecting");

        let task = tokio::spawn(async move {
            let attempt = tokio::time::timeout(timeout, async {
                let ws = WebSocketConnection::dial(addr, hello.max_message_bytes).await?;
                let conn =
                    SecureConnection::establish(ws, Side::Initiator, &hello.local_peer, &hello.service, hello.timeout)
                        .await?;
                if let Some(expected) = &expected {
                    if conn.remote_peer() != expected {
                        return Err(TransportError::Handshake(format!(
                            "expected {expected}, reached {}",
                            conn.remote_peer()
                        )));
                    }
                }
                Ok(conn)
            })
            .await;

            match attempt {
                Ok(Ok(conn)) => sink.emit(Event::Connected(Arc::new(conn))),
                Ok(Err(error)) => sink.emit(Event::ConnectFailed { target: addr, error }),
                Err(_) => sink.emit(Event::ConnectFailed {
                    target: addr,
                    error: TransportError::Timeout(timeout),
                }),
            }
        });
        self.dials.push(task);
    }

    // -- Messaging --

    /// Encodes `envelope` and queues it for `recipient`.
    ///
    /// Fire-and-forget: with no connected peer, or if encoding fails, the
    /// envelope is logged and dropped.
    pub fn send(&self, envelope: &Envelope, recipient: &Recipient) {
        if self.links.is_empty() {
            tracing::warn!(kind = %envelope.kind, "no connected peers, dropping envelope");
            return;
        }
        let bytes = match self.codec.encode(envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(kind = %envelope.kind, error = %e, "envelope encode failed");
                return;
            }
        };

        match recipient {
            Recipient::AllConnected => {
                for (peer, link) in &self.links {
                    if link.writer.send(bytes.clone()).is_err() {
                        tracing::debug!(%peer, "writer gone, envelope dropped");
                    }
                }
            }
            Recipient::Peer(peer) => match self.links.get(peer) {
                Some(link) => {
                    if link.writer.send(bytes).is_err() {
                        tracing::debug!(%peer, "writer gone, envelope dropped");
                    }
                }
                None => tracing::warn!(%peer, kind = %envelope.kind, "peer not connected, dropping envelope"),
            },
        }
    }

    /// Takes the most recently received envelope, if one is waiting.
    pub fn take_inbound(&mut self) -> Option<Envelope> {
        self.inbox.take()
    }

    /// Applies everything background tasks reported since the last call.
    ///
    /// Inbound envelopes land in a single slot: if several arrive between
    /// two pumps, only the last one is kept.
    pub fn pump(&mut self) -> Vec<PeerChange> {
        let mut changes = Vec::new();
        let mut dirty = false;

        while let Ok((epoch, event)) = self.events_rx.try_recv() {
            if epoch != self.epoch {
                continue;
            }
            match event {
                Event::Discovery(DiscoveryEvent::Found { peer, addr }) => {
                    if self.discovered.insert(peer.clone(), addr).is_none() {
                        tracing::info!(%peer, %addr, "peer discovered");
                        dirty = true;
                    }
                }
                Event::Discovery(DiscoveryEvent::Lost(peer)) => {
                    if self.discovered.remove(&peer).is_some() {
                        tracing::info!(%peer, "peer lost");
                        dirty = true;
                    }
                }
                Event::Connected(conn) => {
                    if let Some(peer) = self.attach(conn) {
                        changes.push(PeerChange::Connected(peer));
                        dirty = true;
                    }
                }
                Event::ConnectFailed { target, error } => {
                    tracing::warn!(%target, %error, "connect failed");
                }
                Event::Disconnected { peer, link, reason } => {
                    if self.links.get(&peer).is_some_and(|l| l.id == link) {
                        self.links.remove(&peer);
                        tracing::info!(%peer, reason = reason.as_deref().unwrap_or("closed"), "peer disconnected");
                        changes.push(PeerChange::Disconnected(peer));
                        dirty = true;
                    }
                }
                Event::Inbound { peer, envelope } => {
                    tracing::trace!(%peer, kind = %envelope.kind, "envelope received");
                    if let Some(old) = self.inbox.replace(envelope) {
                        tracing::debug!(superseded = %old.kind, "unread inbound envelope replaced");
                    }
                }
            }
        }

        if dirty {
            self.publish();
        }
        changes
    }

    fn attach(&mut self, conn: Arc<SecureConnection>) -> Option<PeerId> {
        let peer = conn.remote_peer().clone();
        if self.links.contains_key(&peer) {
            tracing::debug!(%peer, "duplicate session, closing the new one");
            close_detached(conn);
            return None;
        }
        if self.links.len() >= self.config.max_peers {
            tracing::warn!(%peer, max = self.config.max_peers, "peer limit reached, closing session");
            close_detached(conn);
            return None;
        }

        let id = conn.id();
        let (writer, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(Arc::clone(&conn), writer_rx, self.sink()));
        let reader = tokio::spawn(read_loop(conn, self.codec, self.sink()));

        tracing::info!(%peer, link = %id, "peer connected");
        self.links.insert(peer.clone(), Link { id, writer, reader });
        Some(peer)
    }

    /// Tears everything down: links, dials, listener, beacons and
    /// discovery. Safe to call in any state; afterwards every flag is
    /// false and every set is empty.
    pub fn disconnect(&mut self) {
        self.epoch += 1;
        for dial in self.dials.drain(..) {
            dial.abort();
        }
        self.links.clear();
        self.listening = None;
        self.browser = None;
        self.discovered.clear();
        self.inbox = None;
        while self.events_rx.try_recv().is_ok() {}

        tracing::info!(peer = %self.local_peer, "transport disconnected");
        self.publish();
    }
}

impl Drop for PeerTransport {
    fn drop(&mut self) {
        for dial in &self.dials {
            dial.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Background tasks
// ---------------------------------------------------------------------------

fn close_detached(conn: Arc<SecureConnection>) {
    tokio::spawn(async move {
        let _ = conn.close().await;
    });
}

async fn accept_loop(listener: WebSocketListener, sink: EventSink, hello: HelloParams) {
    loop {
        match listener.accept_tcp().await {
            Ok((stream, remote)) => {
                let sink = sink.clone();
                let hello = hello.clone();
                tokio::spawn(async move {
                    match accept_session(stream, remote, &hello).await {
                        Ok(conn) => sink.emit(Event::Connected(Arc::new(conn))),
                        Err(e) => tracing::warn!(%remote, error = %e, "inbound session refused"),
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn accept_session(
    stream: TcpStream,
    remote: SocketAddr,
    hello: &HelloParams,
) -> Result<SecureConnection, TransportError> {
    let upgrade = WebSocketConnection::upgrade(stream, remote, hello.max_message_bytes);
    let ws = tokio::time::timeout(hello.timeout, upgrade)
        .await
        .map_err(|_| TransportError::Timeout(hello.timeout))??;
    SecureConnection::establish(ws, Side::Responder, &hello.local_peer, &hello.service, hello.timeout).await
}

async fn write_loop(conn: Arc<SecureConnection>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>, sink: EventSink) {
    while let Some(bytes) = rx.recv().await {
        if let Err(e) = conn.send(&bytes).await {
            sink.emit(Event::Disconnected {
                peer: conn.remote_peer().clone(),
                link: conn.id(),
                reason: Some(e.to_string()),
            });
            return;
        }
    }
    let _ = conn.close().await;
}

async fn read_loop(conn: Arc<SecureConnection>, codec: WireFormat, sink: EventSink) {
    let peer = conn.remote_peer().clone();
    let reason = loop {
        match conn.recv().await {
            Ok(Some(bytes)) => match codec.decode::<Envelope>(&bytes) {
                Ok(envelope) => sink.emit(Event::Inbound {
                    peer: peer.clone(),
                    envelope,
                }),
                Err(e) => tracing::warn!(%peer, error = %e, "undecodable envelope dropped"),
            },
            Ok(None) => break None,
            Err(e) => break Some(e.to_string()),
        }
    };
    sink.emit(Event::Disconnected {
        peer,
        link: conn.id(),
        reason,
    });
}
