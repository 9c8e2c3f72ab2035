//! Error taxonomy for the client core. Nothing here is fatal to the process;
//! every failure degrades to a visible, recoverable UI state.

use std::time::Duration;

use crate::state::{PlayerId, Seat};

/// Failure to acquire or resume a room session. Surfaced to the caller and
/// never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("room {0} is full")]
    RoomFull(String),
    #[error("room {0} not found")]
    RoomNotFound(String),
    #[error("join rejected: {0}")]
    Rejected(String),
    #[error("join request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl JoinError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Connection-level failure: handshake, drop, or an unparseable frame.
/// Reconnection is a caller-initiated action, not automatic inside the core.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("cannot send: connection is closed")]
    SendClosed,
    #[error("websocket error: {0}")]
    Socket(String),
    #[error(transparent)]
    Frame(#[from] ProtocolError),
}

/// A frame the codec could not make sense of. Unrecognized-but-well-formed
/// envelopes are NOT errors; they decode to [`ServerEvent::Unknown`] and are
/// logged by the event-log projector.
///
/// [`ServerEvent::Unknown`]: crate::protocol::ServerEvent::Unknown
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),
    #[error("unexpected payload for {kind}: {source}")]
    UnexpectedPayload {
        kind: String,
        source: serde_json::Error,
    },
}

/// An action the local player is not allowed to take. Rejected client-side,
/// never sent to the server.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LocalPolicyViolation {
    #[error("dead players cannot act")]
    ActorDead,
    #[error("no action panel is active")]
    NoPanelActive,
    #[error("action not available in the current phase")]
    WrongPhase,
    #[error("only the host may do this")]
    NotHost,
    #[error("no target selected")]
    NothingSelected,
    #[error("action already confirmed this phase")]
    AlreadyConfirmed,
    #[error("target {0} cannot be selected")]
    TargetForbidden(PlayerId),
    #[error("seat {0} is unavailable")]
    SeatUnavailable(Seat),
    #[error("that potion has already been spent")]
    PotionSpent,
}
