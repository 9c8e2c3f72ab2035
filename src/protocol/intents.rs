//! Outbound intent messages.

use serde::{Deserialize, Serialize};

use crate::state::{PlayerId, Seat};

/// Everything the client may ask of the server. Serializes to the wire
/// envelope `{"type": "...", "payload": {...}}` directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientIntent {
    TakeSeat { seat: Seat },
    ReadyToggle,
    StartGame,
    WerewolfVote { target_player_id: PlayerId },
    WitchAction(WitchAction),
    SeerCheck { target_player_id: PlayerId },
    GuardAction { target_player_id: PlayerId },
    VotePlayer { target_player_id: PlayerId },
    RunForSheriff,
    WithdrawCandidacy,
    SheriffVote { target_player_id: PlayerId },
    PassTurn,
    ConfirmAction,
}

/// The witch holds one save and one poison for the whole game and may use at
/// most one of them per night.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WitchAction {
    Save,
    Poison { target_player_id: PlayerId },
}
