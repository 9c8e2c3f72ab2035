//! Typed inbound events and their payload shapes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{GameState, Phase, Player, PlayerId, Role, Winner};

/// Everything the server can push down the persistent connection.
///
/// Exactly one variant per recognized envelope type; anything else lands in
/// [`ServerEvent::Unknown`] with its raw payload preserved so the event log
/// can still leave a trace.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    GameStart { room: GameState },
    GameStateUpdate { room: GameState },
    PhaseChange(PhaseChangePayload),
    PlayerJoined { player: Player },
    /// Unicast. Only ever addressed to one connection; its absence means
    /// "my role unknown", never "no role".
    RoleAssignment(RoleAssignmentPayload),
    NightResult(NightResultPayload),
    VoteUpdate { votes: BTreeMap<PlayerId, PlayerId> },
    WerewolfVoteUpdate { votes: BTreeMap<PlayerId, PlayerId> },
    VoteResult(VoteResultPayload),
    /// Unicast seer feedback: target id -> "good"/"bad".
    SeerResult { checked: BTreeMap<PlayerId, String> },
    SheriffElection(SheriffElectionPayload),
    GameEvent { message: String },
    PlayerDisconnected { player_id: PlayerId },
    /// Authorization to present one role-action panel. UI state, not
    /// narrative; the event log never records these.
    Panel(PanelGrant),
    GameOver(GameOverPayload),
    Unknown { kind: String, payload: Value },
}

impl ServerEvent {
    pub fn is_panel_grant(&self) -> bool {
        matches!(self, ServerEvent::Panel(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PanelGrant {
    Werewolf(WerewolfPanelContext),
    Witch(WitchPanelContext),
    Seer(SeerPanelContext),
    Guard(GuardPanelContext),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChangePayload {
    #[serde(alias = "stage")]
    pub phase: Phase,
    #[serde(default)]
    pub day: Option<u32>,
    /// Absolute serverclock deadline; absence means the phase is untimed.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub phase_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deaths: Vec<PlayerId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teammate {
    pub id: PlayerId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub seat: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignmentPayload {
    pub player_id: PlayerId,
    pub role: Role,
    /// Faction teammates, present only for members of that faction.
    #[serde(default)]
    pub teammates: Vec<Teammate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NightResultPayload {
    #[serde(default)]
    pub dead: Vec<PlayerId>,
    #[serde(default)]
    pub saved: Option<PlayerId>,
    #[serde(default)]
    pub poisoned: Option<PlayerId>,
    #[serde(default)]
    pub checked: Option<BTreeMap<PlayerId, Role>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResultPayload {
    #[serde(default, alias = "exiled_player_id")]
    pub eliminated: Option<PlayerId>,
    #[serde(default)]
    pub votes: BTreeMap<PlayerId, PlayerId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheriffElectionPayload {
    #[serde(default)]
    pub candidates: Vec<PlayerId>,
    #[serde(default)]
    pub current_speaker_id: Option<PlayerId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub winner: Winner,
    /// The sanctioned full role reveal.
    #[serde(default)]
    pub roles: BTreeMap<PlayerId, Role>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WerewolfPanelContext {
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default)]
    pub teammates: Vec<Teammate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitchPanelContext {
    #[serde(default)]
    pub werewolf_target: Option<PlayerId>,
    pub has_save: bool,
    pub has_poison: bool,
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeerPanelContext {
    #[serde(default)]
    pub players: Vec<Player>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPanelContext {
    #[serde(default)]
    pub players: Vec<Player>,
    /// The guard may not protect the same player two nights running.
    #[serde(default)]
    pub last_guarded_id: Option<PlayerId>,
}
