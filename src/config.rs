//! Client configuration and the game-template types supplied by the external
//! game-template collaborator.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::state::Role;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the join/session HTTP API.
    pub http_base: Url,
    /// Base URL of the persistent-connection endpoint (ws:// or wss://).
    pub ws_base: Url,
    pub handshake_timeout: Duration,
    pub inbound_capacity: usize,
    pub outbound_capacity: usize,
    pub command_capacity: usize,
}

impl ClientConfig {
    pub fn new(http_base: Url, ws_base: Url) -> Self {
        Self {
            http_base,
            ws_base,
            handshake_timeout: Duration::from_secs(10),
            inbound_capacity: 64,
            outbound_capacity: 32,
            command_capacity: 32,
        }
    }
}

/// The configuration a room was created with. Carried opaquely; only the
/// server interprets it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub template_name: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "GameConfig::default_allow_spectators")]
    pub allow_spectators: bool,
}

impl GameConfig {
    fn default_allow_spectators() -> bool {
        true
    }
}

/// A game board: which roles are in play for which player counts. The role
/// list is data, not a compiled-in set; new boards must not require a client
/// release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTemplate {
    pub name: String,
    pub player_counts: Vec<u8>,
    pub roles: BTreeMap<Role, u8>,
    #[serde(default)]
    pub description: String,
}

impl GameTemplate {
    pub fn supports_player_count(&self, count: u8) -> bool {
        self.player_counts.contains(&count)
    }

    pub fn total_roles(&self) -> u16 {
        self.roles.values().map(|&n| u16::from(n)).sum()
    }
}
