//! Canonical data model for a room, mirrored from the server's snapshots.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GameConfig;

pub type PlayerId = String;
pub type ProfileId = String;
pub type RoomId = String;
pub type Seat = u8; // 0..MAX_SEATS

pub const MAX_SEATS: Seat = 12;

/// A role name as the server speaks it. The role board is configuration owned
/// by the game-template collaborator, so the client treats roles as opaque
/// identifiers and never branches on their meaning.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    #[serde(alias = "GOOD")]
    Good,
    #[serde(alias = "WOLF", alias = "bad")]
    Wolf,
}

/// The server-asserted segment of the game's turn structure.
///
/// The set is closed and ordered, but the server may skip optional sub-phases
/// (the sheriff flow, night turns with no living holder of the role), so the
/// client only ever checks that a transition is plausible, never that it
/// matches a fixed sequence. Aliases cover the UPPER stage vocabulary an
/// earlier server iteration emitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[serde(alias = "WAITING")]
    Lobby,
    #[serde(alias = "ROLE_ASSIGN")]
    RoleAssignment,
    #[serde(alias = "NIGHT_START")]
    GuardTurn,
    #[serde(alias = "NIGHT_SKILLS")]
    WerewolfTurn,
    WitchTurn,
    SeerTurn,
    #[serde(alias = "DAWN", alias = "NIGHT_RESOLVE")]
    Dawn,
    SheriffElection,
    SheriffSpeech,
    SheriffVote,
    #[serde(alias = "SPEECH", alias = "SPEECH_ORDER", alias = "day")]
    DayDiscussion,
    #[serde(alias = "VOTE")]
    Voting,
    #[serde(alias = "VOTE_RESOLVE")]
    VoteResolution,
    #[serde(alias = "GAME_OVER", alias = "ended")]
    GameOver,
}

impl Phase {
    /// Position in the canonical turn order, used to diagnose out-of-order
    /// transitions. The index wraps when a new day begins.
    pub fn order_index(&self) -> u8 {
        match self {
            Phase::Lobby => 0,
            Phase::RoleAssignment => 1,
            Phase::GuardTurn => 2,
            Phase::WerewolfTurn => 3,
            Phase::WitchTurn => 4,
            Phase::SeerTurn => 5,
            Phase::Dawn => 6,
            Phase::SheriffElection => 7,
            Phase::SheriffSpeech => 8,
            Phase::SheriffVote => 9,
            Phase::DayDiscussion => 10,
            Phase::Voting => 11,
            Phase::VoteResolution => 12,
            Phase::GameOver => 13,
        }
    }

    pub fn is_night(&self) -> bool {
        matches!(
            self,
            Phase::GuardTurn | Phase::WerewolfTurn | Phase::WitchTurn | Phase::SeerTurn
        )
    }

    /// Whether a game is actually being played in this phase.
    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Lobby | Phase::GameOver)
    }

    /// Human-readable banner text for the event log.
    pub fn description(&self) -> &'static str {
        match self {
            Phase::Lobby => "Waiting in the lobby",
            Phase::RoleAssignment => "Roles are being dealt",
            Phase::GuardTurn => "The guard chooses someone to protect",
            Phase::WerewolfTurn => "The werewolves are hunting",
            Phase::WitchTurn => "The witch weighs her potions",
            Phase::SeerTurn => "The seer peers into a soul",
            Phase::Dawn => "Dawn breaks over the village",
            Phase::SheriffElection => "Sheriff candidacy is open",
            Phase::SheriffSpeech => "Sheriff candidates are speaking",
            Phase::SheriffVote => "The village elects a sheriff",
            Phase::DayDiscussion => "The village is discussing",
            Phase::Voting => "The village is voting",
            Phase::VoteResolution => "Votes are being counted",
            Phase::GameOver => "The game is over",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// In-game id, session scoped. Distinct from the long-lived profile id.
    pub id: PlayerId,
    pub profile_id: ProfileId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub seat: Option<Seat>,
    #[serde(default = "default_true")]
    pub is_alive: bool,
    /// Populated only for the local player once assigned, and for everyone
    /// once the game-over reveal lands. Never earlier.
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub is_sheriff: bool,
    #[serde(default)]
    pub is_host: bool,
    #[serde(default)]
    pub is_ready: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub room_id: RoomId,
    #[serde(default)]
    pub players: Vec<Player>,
    #[serde(default = "GameState::default_phase", alias = "stage")]
    pub phase: Phase,
    #[serde(default)]
    pub day: u32,
    pub host_id: ProfileId,
    /// Absolute serverclock deadline for the current phase. Absent means the
    /// phase is untimed.
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub phase_end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sheriff_candidates: Vec<PlayerId>,
    #[serde(default)]
    pub current_speaker_id: Option<PlayerId>,
    #[serde(default)]
    pub nightly_deaths: Vec<PlayerId>,
    #[serde(default)]
    pub winner: Option<Winner>,
    #[serde(default)]
    pub game_config: Option<GameConfig>,
}

impl GameState {
    fn default_phase() -> Phase {
        Phase::Lobby
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_mut(&mut self, id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    pub fn player_by_profile(&self, profile_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.profile_id == profile_id)
    }

    pub fn living_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive)
    }

    pub fn is_host_profile(&self, profile_id: &str) -> bool {
        self.host_id == profile_id
    }

    pub fn seat_taken(&self, seat: Seat) -> bool {
        self.players.iter().any(|p| p.seat == Some(seat))
    }

    /// Display name for a player id, falling back to the raw id.
    pub fn display_name(&self, id: &str) -> String {
        match self.player(id) {
            Some(p) if !p.name.is_empty() => p.name.clone(),
            _ => id.to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StateError {
    InvariantViolation(&'static str),
}

pub trait InvariantCheck {
    fn validate_invariants(&self) -> Result<(), StateError>;
}

impl InvariantCheck for GameState {
    fn validate_invariants(&self) -> Result<(), StateError> {
        let mut seen_seats: BTreeMap<Seat, &PlayerId> = BTreeMap::new();
        for (i, p) in self.players.iter().enumerate() {
            if self.players[..i].iter().any(|q| q.id == p.id) {
                return Err(StateError::InvariantViolation("duplicate player id"));
            }
            if let Some(seat) = p.seat {
                if seat >= MAX_SEATS {
                    return Err(StateError::InvariantViolation("seat out of range"));
                }
                if seen_seats.insert(seat, &p.id).is_some() {
                    return Err(StateError::InvariantViolation("duplicate seat"));
                }
            }
        }
        if self.winner.is_some() && self.phase != Phase::GameOver {
            return Err(StateError::InvariantViolation("winner before game over"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, seat: Option<Seat>) -> Player {
        Player {
            id: id.to_string(),
            profile_id: format!("profile-{id}"),
            name: id.to_uppercase(),
            avatar_url: None,
            seat,
            is_alive: true,
            role: None,
            is_sheriff: false,
            is_host: false,
            is_ready: false,
        }
    }

    fn state(players: Vec<Player>) -> GameState {
        GameState {
            room_id: "room-1".to_string(),
            players,
            phase: Phase::Lobby,
            day: 0,
            host_id: "profile-a".to_string(),
            phase_end_time: None,
            sheriff_candidates: Vec::new(),
            current_speaker_id: None,
            nightly_deaths: Vec::new(),
            winner: None,
            game_config: None,
        }
    }

    #[test]
    fn phase_decodes_both_wire_vocabularies() {
        let lower: Phase = serde_json::from_str("\"werewolf_turn\"").unwrap();
        assert_eq!(lower, Phase::WerewolfTurn);
        let stage: Phase = serde_json::from_str("\"WAITING\"").unwrap();
        assert_eq!(stage, Phase::Lobby);
        let legacy: Phase = serde_json::from_str("\"ended\"").unwrap();
        assert_eq!(legacy, Phase::GameOver);
    }

    #[test]
    fn phase_order_is_strictly_increasing() {
        let order = [
            Phase::Lobby,
            Phase::RoleAssignment,
            Phase::GuardTurn,
            Phase::WerewolfTurn,
            Phase::WitchTurn,
            Phase::SeerTurn,
            Phase::Dawn,
            Phase::SheriffElection,
            Phase::SheriffSpeech,
            Phase::SheriffVote,
            Phase::DayDiscussion,
            Phase::Voting,
            Phase::VoteResolution,
            Phase::GameOver,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].order_index() < pair[1].order_index());
        }
    }

    #[test]
    fn player_defaults_fill_sparse_snapshots() {
        let p: Player =
            serde_json::from_str(r#"{"id": "p1", "profile_id": "profile-1"}"#).unwrap();
        assert!(p.is_alive);
        assert_eq!(p.seat, None);
        assert_eq!(p.role, None);
        assert!(!p.is_host);
    }

    #[test]
    fn duplicate_seats_violate_invariants() {
        let st = state(vec![player("a", Some(1)), player("b", Some(1))]);
        assert_eq!(
            st.validate_invariants(),
            Err(StateError::InvariantViolation("duplicate seat"))
        );
    }

    #[test]
    fn unique_seats_pass_invariants() {
        let st = state(vec![player("a", Some(0)), player("b", Some(1)), player("c", None)]);
        assert_eq!(st.validate_invariants(), Ok(()));
    }

    #[test]
    fn winner_outside_game_over_is_rejected() {
        let mut st = state(vec![player("a", None)]);
        st.winner = Some(Winner::Good);
        assert!(st.validate_invariants().is_err());
    }

    #[test]
    fn phase_end_time_round_trips_as_epoch_seconds() {
        let mut st = state(vec![]);
        st.phase_end_time = Some(DateTime::from_timestamp(1_700_000_045, 0).unwrap());
        let json = serde_json::to_value(&st).unwrap();
        assert_eq!(json["phase_end_time"], serde_json::json!(1_700_000_045));
        let back: GameState = serde_json::from_value(json).unwrap();
        assert_eq!(back.phase_end_time, st.phase_end_time);
    }
}
