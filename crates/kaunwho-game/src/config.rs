//! Game rules and the session state machine.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameRules
// ---------------------------------------------------------------------------

/// Tunable rules for one match.
///
/// Both peers should run with the same rules. Only the host's values
/// matter for the board, because the peer that calls `start_game`
/// broadcasts the resulting snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameRules {
    /// Photos each player must pick before the game can start.
    pub min_photos_per_player: usize,

    /// Maximum number of photos on the shared board. A smaller pool
    /// yields a smaller board; nothing is padded.
    pub board_size: usize,

    /// Length of the photo-selection countdown in seconds.
    pub photo_selection_secs: u64,
}

impl GameRules {
    pub fn photo_selection_time(&self) -> Duration {
        Duration::from_secs(self.photo_selection_secs)
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            min_photos_per_player: 8,
            board_size: 15,
            photo_selection_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// Transitions are strictly ordered:
///
/// ```text
/// WaitingForPlayers → PhotoSelection → GameSetup → Playing → GameOver
/// ```
///
/// Going from `GameOver` back to `WaitingForPlayers` is not a transition;
/// it is a reset that throws the session away.
///
/// The serde names are short because they travel inside every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameState {
    #[default]
    #[serde(rename = "waiting")]
    WaitingForPlayers,
    #[serde(rename = "photos")]
    PhotoSelection,
    #[serde(rename = "setup")]
    GameSetup,
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "over")]
    GameOver,
}

impl GameState {
    /// Returns `true` while players may still join and pick photos.
    pub fn is_selecting(&self) -> bool {
        matches!(self, Self::WaitingForPlayers | Self::PhotoSelection)
    }

    /// Returns `true` while turns are being played.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing)
    }

    /// The state that follows this one, or `None` after `GameOver`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::WaitingForPlayers => Some(Self::PhotoSelection),
            Self::PhotoSelection => Some(Self::GameSetup),
            Self::GameSetup => Some(Self::Playing),
            Self::Playing => Some(Self::GameOver),
            Self::GameOver => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForPlayers => write!(f, "WaitingForPlayers"),
            Self::PhotoSelection => write!(f, "PhotoSelection"),
            Self::GameSetup => write!(f, "GameSetup"),
            Self::Playing => write!(f, "Playing"),
            Self::GameOver => write!(f, "GameOver"),
        }
    }
}

// ---------------------------------------------------------------------------
// PlayerRole
// ---------------------------------------------------------------------------

/// Which seat a peer holds. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    Host,
    Guest,
}

impl PlayerRole {
    pub fn opposite(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Guest => write!(f, "guest"),
        }
    }
}
