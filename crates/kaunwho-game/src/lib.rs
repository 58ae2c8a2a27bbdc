//! Game state for KaunWho.
//!
//! This crate owns the session record two peers keep in sync and the
//! transitions that change it. It never touches the network: the
//! controller in the `kaunwho` crate decides when to call these functions
//! and what to broadcast afterwards.
//!
//! # Key types
//!
//! - [`GameSession`]: players, shared board, turn and outcome
//! - [`GameStore`]: holds the local session and applies transitions
//! - [`GameState`]: lifecycle state machine
//! - [`GameRules`]: photo minimum, board size, selection time
//! - [`SelectionCountdown`]: the photo-selection timer
//!
//! Transitions that draw random numbers take an explicit [`rand::Rng`]
//! so tests can replay them with a seeded generator.

mod config;
mod error;
mod model;
mod rules;
mod selection;
mod store;

pub use config::{GameRules, GameState, PlayerRole};
pub use error::GameError;
pub use model::{GameSession, Photo, PhotoId, Player, PlayerId, SessionId};
pub use rules::{accept_guest, eliminate, end_turn, guess, record_winner, start_game};
pub use selection::SelectionCountdown;
pub use store::GameStore;
