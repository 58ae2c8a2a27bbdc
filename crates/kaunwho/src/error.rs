//! Unified error type for KaunWho.

use kaunwho_game::GameError;
use kaunwho_protocol::ProtocolError;
use kaunwho_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// Game operations on [`ManagerHandle`](crate::ManagerHandle) absorb
/// transport, protocol and game failures (they only show up as "nothing
/// changed"), so in practice callers see [`ManagerUnavailable`] and
/// [`Config`]. The wrapped variants exist for code that drives the
/// sub-crates directly and wants one error type.
///
/// [`ManagerUnavailable`]: KaunWhoError::ManagerUnavailable
/// [`Config`]: KaunWhoError::Config
#[derive(Debug, thiserror::Error)]
pub enum KaunWhoError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Game(#[from] GameError),

    /// The configuration text is not valid TOML for [`ManagerConfig`](crate::ManagerConfig).
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The manager task has stopped; the handle can no longer be used.
    #[error("game manager is not running")]
    ManagerUnavailable,
}
