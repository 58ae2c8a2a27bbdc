//! Payloads for the narrow envelope types.
//!
//! The full [`GameSession`](kaunwho_game::GameSession) snapshot is always
//! authoritative; these deltas only let the receiver update a little
//! earlier, and applying one twice changes nothing.

use kaunwho_game::{PhotoId, PlayerRole};
use serde::{Deserialize, Serialize};

/// Payload of `eliminationUpdate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EliminationDelta {
    pub photo_id: PhotoId,
}

/// Payload of `gameOver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverDelta {
    pub winner: PlayerRole,
}

/// Payload of `joinRejected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRejection {
    pub reason: String,
}
