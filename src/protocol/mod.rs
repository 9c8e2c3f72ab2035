//! Wire codec for the `{type, payload}` envelope protocol.
//!
//! Inbound frames decode into the closed [`ServerEvent`] sum type at this
//! boundary so everything downstream matches exhaustively instead of
//! comparing strings; unrecognized types survive as [`ServerEvent::Unknown`].

pub mod envelope;
pub mod events;
pub mod intents;

pub use envelope::{decode_event, encode_intent};
pub use events::{
    GameOverPayload, GuardPanelContext, NightResultPayload, PanelGrant, PhaseChangePayload,
    RoleAssignmentPayload, SeerPanelContext, ServerEvent, SheriffElectionPayload, Teammate,
    VoteResultPayload, WerewolfPanelContext, WitchPanelContext,
};
pub use intents::{ClientIntent, WitchAction};
