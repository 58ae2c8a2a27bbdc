//! Configuration aggregate for a KaunWho peer.

use kaunwho_game::GameRules;
use kaunwho_tick::PollConfig;
use kaunwho_transport::TransportConfig;
use serde::{Deserialize, Serialize};

use crate::KaunWhoError;

/// Everything one peer needs to run a game.
///
/// Every section is optional in TOML; missing keys take their defaults.
///
/// ```toml
/// device_name = "Ava's laptop"
///
/// [transport]
/// wire_format = "json"
///
/// [rules]
/// board_size = 12
///
/// [poll]
/// interval_ms = 50
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Shown to other peers during discovery.
    pub device_name: String,
    pub transport: TransportConfig,
    pub rules: GameRules,
    pub poll: PollConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            device_name: "kaunwho".into(),
            transport: TransportConfig::default(),
            rules: GameRules::default(),
            poll: PollConfig::default(),
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, KaunWhoError> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults with loopback-only networking.
    pub fn loopback(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            transport: TransportConfig::loopback(),
            ..Self::default()
        }
    }
}
