//! The session record and the values inside it.
//!
//! Everything here is plain owned data. Each peer holds its own
//! [`GameSession`]; the copies only meet when one side serializes a
//! snapshot and the other replaces its value with it.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{GameRules, GameState, PlayerRole};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// A fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        /// Prints the prefix and the first eight hex digits, enough to
        /// tell ids apart in logs.
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{:08x}"), self.0.as_fields().0)
            }
        }
    };
}

uuid_id!(
    /// Stable identifier of a player, chosen when the player is created.
    PlayerId,
    "P"
);
uuid_id!(
    /// Identifier of a photo. It survives the copy onto the shared board,
    /// which is how mystery faces and eliminations refer to board entries.
    PhotoId,
    "F"
);
uuid_id!(
    /// Identifier of one game session.
    SessionId,
    "S"
);

// ---------------------------------------------------------------------------
// Photo
// ---------------------------------------------------------------------------

/// One face photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    /// Encoded image bytes. Opaque to the game.
    pub image_data: Vec<u8>,
    pub is_eliminated: bool,
}

impl Photo {
    pub fn new(image_data: Vec<u8>) -> Self {
        Self {
            id: PhotoId::new(),
            image_data,
            is_eliminated: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// A participant and the photos they contributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub photos: Vec<Photo>,
    /// Board photo this player is trying to identify. Set at game start.
    pub mystery_face: Option<PhotoId>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PlayerId::new(),
            name: name.into(),
            photos: Vec::new(),
            mystery_face: None,
        }
    }

    /// Appends a photo and returns its id.
    pub fn add_photo(&mut self, photo: Photo) -> PhotoId {
        let id = photo.id;
        self.photos.push(photo);
        id
    }

    /// Removes the photo with `id`, returning it if it was present.
    pub fn remove_photo(&mut self, id: PhotoId) -> Option<Photo> {
        let index = self.photos.iter().position(|p| p.id == id)?;
        Some(self.photos.remove(index))
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// The shared game record.
///
/// Invariants kept by the transition functions in this crate:
///
/// - `shared_board` is empty until the session reaches `Playing`.
/// - `winner` is set if and only if the state is `GameOver`.
/// - `current_turn` is unset before `Playing`.
/// - Board order is fixed at game start; entries are only mutated in
///   place by elimination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub host_player: Player,
    pub guest_player: Option<Player>,
    pub state: GameState,
    pub shared_board: Vec<Photo>,
    pub current_turn: Option<PlayerRole>,
    pub winner: Option<PlayerRole>,
    /// Milliseconds since the Unix epoch on the creating peer.
    pub created_at: u64,
}

impl GameSession {
    /// A fresh session hosted by `host`, waiting for a guest.
    pub fn new(host: Player) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id: SessionId::new(),
            host_player: host,
            guest_player: None,
            state: GameState::WaitingForPlayers,
            shared_board: Vec::new(),
            current_turn: None,
            winner: None,
            created_at,
        }
    }

    /// Host first, then the guest if present.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        std::iter::once(&self.host_player).chain(self.guest_player.as_ref())
    }

    pub fn player(&self, role: PlayerRole) -> Option<&Player> {
        match role {
            PlayerRole::Host => Some(&self.host_player),
            PlayerRole::Guest => self.guest_player.as_ref(),
        }
    }

    pub fn player_mut(&mut self, role: PlayerRole) -> Option<&mut Player> {
        match role {
            PlayerRole::Host => Some(&mut self.host_player),
            PlayerRole::Guest => self.guest_player.as_mut(),
        }
    }

    /// Which seat `id` occupies, if any.
    pub fn role_of(&self, id: PlayerId) -> Option<PlayerRole> {
        if self.host_player.id == id {
            Some(PlayerRole::Host)
        } else if self.guest_player.as_ref().is_some_and(|g| g.id == id) {
            Some(PlayerRole::Guest)
        } else {
            None
        }
    }

    pub fn board_photo(&self, id: PhotoId) -> Option<&Photo> {
        self.shared_board.iter().find(|p| p.id == id)
    }

    /// The board entry assigned as `role`'s mystery face.
    pub fn mystery_face(&self, role: PlayerRole) -> Option<&Photo> {
        let id = self.player(role)?.mystery_face?;
        self.board_photo(id)
    }

    /// A guest is present and both players have picked at least
    /// `rules.min_photos_per_player` photos.
    pub fn is_ready_to_start(&self, rules: &GameRules) -> bool {
        let min = rules.min_photos_per_player;
        self.guest_player.as_ref().is_some_and(|guest| {
            self.host_player.photo_count() >= min && guest.photo_count() >= min
        })
    }
}
