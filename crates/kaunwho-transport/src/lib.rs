//! Peer transport for KaunWho.
//!
//! Finds another KaunWho instance on the local network, opens one
//! encrypted reliable session with it and carries protocol envelopes
//! across that session.
//!
//! # Layers
//!
//! - [`discovery`]: UDP beacons that announce presence and notice peers.
//! - [`WebSocketConnection`]: one reliable ordered byte-message channel
//!   over TCP.
//! - [`SecureConnection`]: the same channel after an X25519 hello,
//!   every frame sealed with ChaCha20-Poly1305.
//! - [`PeerTransport`]: the owner-side facade with observable state and
//!   the single-slot inbox.
//!
//! Background tasks never touch [`PeerTransport`] state directly. They
//! post events that the owner applies in [`PeerTransport::pump`], so all
//! observable state has exactly one writer.

#![allow(async_fn_in_trait)]

mod config;
pub mod discovery;
mod error;
mod peer;
mod secure;
mod websocket;

pub use config::TransportConfig;
pub use error::TransportError;
pub use peer::{PeerChange, PeerTransport, Recipient, TransportState};
pub use secure::{Hello, SecureConnection, Side};
pub use websocket::{WebSocketConnection, WebSocketListener};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier for one link. A reconnect to the same peer gets a
/// new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Identity of a transport endpoint on the network.
///
/// A display name plus a random suffix, e.g. `Ava#1f03c2aa`, so two
/// devices whose owners typed the same name remain distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// A fresh id for a device named `display_name`.
    pub fn generate(display_name: &str) -> Self {
        Self(format!("{display_name}#{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name part, without the random suffix.
    pub fn display_name(&self) -> &str {
        self.0.rsplit_once('#').map_or(&self.0, |(name, _)| name)
    }
}

impl From<&str> for PeerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single connection that can send and receive whole messages.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Sends one message to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}
