//! The phase state store: canonical `GameState`, event application, and the
//! derived live countdown.

pub mod countdown;
pub mod game_state;
pub mod store;

pub use countdown::{remaining_secs, Countdown};
pub use game_state::{
    GameState, InvariantCheck, Phase, Player, PlayerId, ProfileId, Role, RoomId, Seat, StateError,
    Winner, MAX_SEATS,
};
pub use store::PhaseStateStore;
