//! # KaunWho
//!
//! A two-player photo guessing game over the local network.
//!
//! Each player picks photos of faces; at game start both sets are pooled
//! into a shared board and each player is secretly assigned one board
//! photo. Players take turns eliminating candidates until one of them
//! guesses their own mystery face (or guesses wrong and hands the win to
//! the opponent).
//!
//! This crate is the controller that keeps the two peers' copies of the
//! game in step. It ties the layers together:
//!
//! ```text
//! UI ─▶ ManagerHandle ─▶ GameManager ─▶ GameStore      (kaunwho-game)
//!                             │
//!                             └──────▶ PeerTransport   (kaunwho-transport)
//!                                         │ Envelope   (kaunwho-protocol)
//!                                         ▼
//!                                     remote peer
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use kaunwho::prelude::*;
//!
//! # async fn run() -> Result<(), KaunWhoError> {
//! let host = spawn_manager(ManagerConfig::default());
//! host.create_game("Ava").await?;
//! host.wait_until(|g| g.game_state == GameState::PhotoSelection).await?;
//! for photo in [vec![1u8], vec![2u8]] {
//!     host.add_photo(photo).await?;
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handle;
pub mod logging;
mod manager;
pub mod messages;

pub use config::ManagerConfig;
pub use error::KaunWhoError;
pub use handle::{ManagerHandle, spawn_manager, spawn_with};
pub use manager::{GameManager, ObservedGame};

pub mod prelude {
    pub use crate::logging::init_logging;
    pub use crate::{GameManager, KaunWhoError, ManagerConfig, ManagerHandle, ObservedGame, spawn_manager};
    pub use kaunwho_game::{GameRules, GameSession, GameState, Photo, PhotoId, Player, PlayerRole};
    pub use kaunwho_protocol::{Envelope, MessageType, WireFormat};
    pub use kaunwho_tick::PollConfig;
    pub use kaunwho_transport::{PeerId, TransportConfig, TransportState};
}
