//! The envelope that travels between two KaunWho peers.
//!
//! Every message on the peer session is one [`Envelope`]: a kind tag, an
//! optional opaque payload and the sender's wall-clock timestamp. The
//! payload is produced by the game layer (usually a whole session
//! snapshot); this module never looks inside it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Codec, ProtocolError};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// What an envelope means.
///
/// The serde names are the stable wire names. Bincode ignores them and
/// encodes the variant index, so variant order is part of the wire format
/// too. Append new kinds at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Guest → host: "let me into your session". Payload: the guest's
    /// player record.
    #[serde(rename = "join_request")]
    JoinRequest,

    /// Host → guest: the join was accepted. A snapshot follows.
    #[serde(rename = "join_accepted")]
    JoinAccepted,

    /// Host → guest: the join was refused. Payload: a reason string.
    #[serde(rename = "join_rejected")]
    JoinRejected,

    /// Either direction: the full session snapshot.
    #[serde(rename = "game_state")]
    GameStateUpdate,

    /// Reserved. Receivers ignore it.
    #[serde(rename = "photo_update")]
    PhotoUpdate,

    /// A photo was eliminated from the shared board.
    #[serde(rename = "elimination")]
    EliminationUpdate,

    /// Reserved. Receivers ignore it.
    #[serde(rename = "guess")]
    GuessAttempt,

    /// The game ended.
    #[serde(rename = "game_over")]
    GameOver,
}

impl MessageType {
    /// The stable wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::JoinRequest => "join_request",
            Self::JoinAccepted => "join_accepted",
            Self::JoinRejected => "join_rejected",
            Self::GameStateUpdate => "game_state",
            Self::PhotoUpdate => "photo_update",
            Self::EliminationUpdate => "elimination",
            Self::GuessAttempt => "guess",
            Self::GameOver => "game_over",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// One message on the peer session.
///
/// In JSON an envelope looks like:
///
/// ```json
/// { "type": "game_state", "data": [ ...bytes... ], "timestamp": 1718000000000 }
/// ```
///
/// `timestamp` is milliseconds since the Unix epoch on the sender's clock.
/// It is informational only; receivers never order by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The kind tag. Named `type` on the wire, which is a Rust keyword,
    /// hence the rename.
    #[serde(rename = "type")]
    pub kind: MessageType,

    /// Opaque payload bytes. `None` for pure signals.
    #[serde(default)]
    pub data: Option<Vec<u8>>,

    /// Sender wall-clock time in milliseconds.
    pub timestamp: u64,
}

impl Envelope {
    /// Builds an envelope stamped with the current time.
    pub fn new(kind: MessageType, data: Option<Vec<u8>>) -> Self {
        Self {
            kind,
            data,
            timestamp: unix_millis(),
        }
    }

    /// An envelope with no payload.
    pub fn signal(kind: MessageType) -> Self {
        Self::new(kind, None)
    }

    /// Encodes `payload` with `codec` and wraps it in an envelope.
    ///
    /// # Errors
    /// Returns the codec's encode error if `payload` cannot be serialized.
    pub fn with_payload<T, C>(
        kind: MessageType,
        payload: &T,
        codec: &C,
    ) -> Result<Self, ProtocolError>
    where
        T: Serialize,
        C: Codec,
    {
        let bytes = codec.encode(payload)?;
        Ok(Self::new(kind, Some(bytes)))
    }

    /// Returns `true` if the envelope carries payload bytes.
    pub fn has_payload(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Decodes the payload as `T`.
    ///
    /// # Errors
    /// - [`ProtocolError::MissingPayload`] if `data` is absent or empty.
    /// - The codec's decode error if the bytes do not describe a `T`.
    pub fn payload<T, C>(&self, codec: &C) -> Result<T, ProtocolError>
    where
        T: DeserializeOwned,
        C: Codec,
    {
        match self.data.as_deref() {
            Some(bytes) if !bytes.is_empty() => codec.decode(bytes),
            _ => Err(ProtocolError::MissingPayload(self.kind)),
        }
    }
}

/// Milliseconds since the Unix epoch. A clock before the epoch reads as 0.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
