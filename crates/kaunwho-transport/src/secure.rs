//! Encrypted peer sessions.
//!
//! Uses X25519 Diffie-Hellman for key agreement, then ChaCha20-Poly1305
//! AEAD for every frame after the hello.
//!
//! ```text
//! initiator                              responder
//!   Hello { version, service, peer_id, public_key }  ──▶
//!   ◀──  Hello { version, service, peer_id, public_key }
//!   shared = X25519(secret, remote_public)
//!   k_i2r = Blake2b-256(shared ‖ "kaunwho/i2r" ‖ pub_i ‖ pub_r)
//!   k_r2i = Blake2b-256(shared ‖ "kaunwho/r2i" ‖ pub_i ‖ pub_r)
//!   sealed frames, nonce = 0u32 ‖ counter_be64
//! ```
//!
//! Both sides send their hello before reading the other, so neither
//! waits on the other to speak first. Nonces are implicit counters: a
//! dropped, reordered or replayed frame fails authentication.
//!
//! Session keys are ephemeral and the hello is not signed: traffic is
//! private from passive listeners, but the remote end is not
//! authenticated.

use std::time::Duration;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use kaunwho_protocol::{Codec, JsonCodec, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{Connection, ConnectionId, PeerId, TransportError, WebSocketConnection};

type Blake2b256 = Blake2b<U32>;

const LABEL_I2R: &[u8] = b"kaunwho/i2r";
const LABEL_R2I: &[u8] = b"kaunwho/r2i";

/// Plaintext opening frame, JSON encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub version: u32,
    pub service: String,
    pub peer_id: PeerId,
    pub public_key: [u8; 32],
}

/// Which end of the session opened the TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Initiator,
    Responder,
}

fn derive_key(shared: &[u8], label: &[u8], initiator: &[u8; 32], responder: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in [shared, label, initiator.as_slice(), responder.as_slice()] {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

fn counter_nonce(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[4..].copy_from_slice(&counter.to_be_bytes());
    Nonce::from(bytes)
}

/// One direction of a session: a key and the next nonce counter.
struct Direction {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl Direction {
    fn new(key: &[u8; 32]) -> Result<Self, TransportError> {
        let cipher = ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| TransportError::Handshake("invalid session key length".into()))?;
        Ok(Self { cipher, counter: 0 })
    }

    fn next_nonce(&mut self) -> Nonce {
        let nonce = counter_nonce(self.counter);
        self.counter += 1;
        nonce
    }

    fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let nonce = self.next_nonce();
        self.cipher.encrypt(&nonce, plaintext).map_err(|_| {
            TransportError::SendFailed(std::io::Error::other("frame encryption failed"))
        })
    }

    fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, TransportError> {
        let nonce = self.next_nonce();
        self.cipher
            .decrypt(&nonce, sealed)
            .map_err(|_| TransportError::Decrypt)
    }
}

/// The pair of per-direction keys one side uses.
struct SessionKeys {
    outbound: Direction,
    inbound: Direction,
}

impl SessionKeys {
    fn derive(
        side: Side,
        secret: &StaticSecret,
        local_public: &PublicKey,
        remote_public: &PublicKey,
    ) -> Result<Self, TransportError> {
        let shared = secret.diffie_hellman(remote_public);
        if !shared.was_contributory() {
            return Err(TransportError::Handshake("non-contributory public key".into()));
        }

        let (initiator, responder) = match side {
            Side::Initiator => (local_public.as_bytes(), remote_public.as_bytes()),
            Side::Responder => (remote_public.as_bytes(), local_public.as_bytes()),
        };
        let i2r = derive_key(shared.as_bytes(), LABEL_I2R, initiator, responder);
        let r2i = derive_key(shared.as_bytes(), LABEL_R2I, initiator, responder);

        let (outbound, inbound) = match side {
            Side::Initiator => (i2r, r2i),
            Side::Responder => (r2i, i2r),
        };
        Ok(Self {
            outbound: Direction::new(&outbound)?,
            inbound: Direction::new(&inbound)?,
        })
    }
}

/// A [`WebSocketConnection`] after a successful hello exchange.
pub struct SecureConnection {
    inner: WebSocketConnection,
    remote_peer: PeerId,
    outbound: Mutex<Direction>,
    inbound: Mutex<Direction>,
}

impl SecureConnection {
    /// Runs the hello exchange on `inner`.
    ///
    /// Fails if the remote speaks another protocol version or service,
    /// claims our own peer id, or does not answer within `timeout`.
    pub async fn establish(
        inner: WebSocketConnection,
        side: Side,
        local_peer: &PeerId,
        service: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let secret = StaticSecret::from(rand::random::<[u8; 32]>());
        let public = PublicKey::from(&secret);

        let hello = Hello {
            version: PROTOCOL_VERSION,
            service: service.to_owned(),
            peer_id: local_peer.clone(),
            public_key: *public.as_bytes(),
        };

        let remote = tokio::time::timeout(timeout, async {
            inner.send(&JsonCodec.encode(&hello)?).await?;
            let bytes = inner
                .recv()
                .await?
                .ok_or_else(|| TransportError::ConnectionClosed("closed during hello".into()))?;
            JsonCodec.decode::<Hello>(&bytes).map_err(TransportError::from)
        })
        .await
        .map_err(|_| TransportError::Timeout(timeout))??;

        if remote.version != PROTOCOL_VERSION {
            return Err(TransportError::Handshake(format!(
                "protocol version {} (expected {PROTOCOL_VERSION})",
                remote.version
            )));
        }
        if remote.service != service {
            return Err(TransportError::Handshake(format!(
                "service {:?} (expected {service:?})",
                remote.service
            )));
        }
        if &remote.peer_id == local_peer {
            return Err(TransportError::Handshake("remote claims our own peer id".into()));
        }

        let keys = SessionKeys::derive(side, &secret, &public, &PublicKey::from(remote.public_key))?;
        tracing::debug!(id = %inner.id(), peer = %remote.peer_id, ?side, "session established");

        Ok(Self {
            inner,
            remote_peer: remote.peer_id,
            outbound: Mutex::new(keys.outbound),
            inbound: Mutex::new(keys.inbound),
        })
    }

    pub fn remote_peer(&self) -> &PeerId {
        &self.remote_peer
    }
}

impl Connection for SecureConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        // Hold the lock across the write so nonce order matches wire order.
        let mut outbound = self.outbound.lock().await;
        let sealed = outbound.seal(data)?;
        self.inner.send(&sealed).await
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut inbound = self.inbound.lock().await;
        match self.inner.recv().await? {
            Some(sealed) => inbound.open(&sealed).map(Some),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.inner.close().await
    }

    fn id(&self) -> ConnectionId {
        self.inner.id()
    }
}
