//! Error types for the game layer.

use crate::{GameState, PhotoId, PlayerId, PlayerRole};

/// Errors returned by session transitions.
///
/// The controller treats every one of these as "nothing happened": it
/// logs at debug level and leaves the session untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// No session has been created or received yet.
    #[error("no active session")]
    NoSession,

    /// The session is in a state that doesn't allow this operation.
    #[error("operation not allowed in state {0}")]
    WrongState(GameState),

    /// `start_game` was called before both players picked enough photos.
    #[error("not ready to start: host has {host} photos, guest has {guest:?}")]
    NotReady { host: usize, guest: Option<usize> },

    /// The photo id is not on the board (or not in the player's list).
    #[error("unknown photo {0}")]
    UnknownPhoto(PhotoId),

    /// The role has no player in this session.
    #[error("no {0} player in session")]
    MissingPlayer(PlayerRole),

    /// A different guest already holds the guest slot.
    #[error("guest slot already taken by {0}")]
    GuestSlotTaken(PlayerId),
}
