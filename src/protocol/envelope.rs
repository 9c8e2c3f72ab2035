//! Envelope encode/decode at the transport boundary.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::ProtocolError;
use crate::protocol::events::{PanelGrant, ServerEvent};
use crate::protocol::intents::ClientIntent;

const LOG_TARGET: &str = "protocol::envelope";

/// The untyped wire shape. An early server iteration shipped snapshot events
/// with a top-level `room` field instead of `payload`; both are accepted.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    room: Option<Value>,
}

impl RawEnvelope {
    fn into_payload(self) -> (String, Value) {
        let RawEnvelope { kind, payload, room } = self;
        (kind, payload.or(room).unwrap_or(Value::Null))
    }
}

pub fn encode_intent(intent: &ClientIntent) -> Result<String, ProtocolError> {
    serde_json::to_string(intent).map_err(ProtocolError::MalformedFrame)
}

/// Decodes one inbound text frame.
///
/// Frames that are not a `{type, ...}` object at all fail with
/// [`ProtocolError::MalformedFrame`]. A recognized type whose payload does not
/// match its expected shape, or an unrecognized type, degrades to
/// [`ServerEvent::Unknown`] so state stays untouched but the envelope still
/// reaches the event log.
pub fn decode_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let (kind, payload) = raw.into_payload();

    let decoded = match kind.to_ascii_uppercase().as_str() {
        "GAME_START" => typed(&kind, payload, |room| ServerEvent::GameStart { room }),
        "GAME_STATE_UPDATE" => typed(&kind, payload, |room| ServerEvent::GameStateUpdate { room }),
        "PHASE_CHANGE" => typed(&kind, payload, ServerEvent::PhaseChange),
        "PLAYER_JOINED" => typed(&kind, payload, |player| ServerEvent::PlayerJoined { player }),
        "ROLE_ASSIGNMENT" | "ROLE_ASSIGN" => typed(&kind, payload, ServerEvent::RoleAssignment),
        "NIGHT_RESULT" | "NIGHT_RESULTS" => typed(&kind, payload, ServerEvent::NightResult),
        "VOTE_UPDATE" => typed(&kind, payload, |votes| ServerEvent::VoteUpdate { votes }),
        "WEREWOLF_VOTE_UPDATE" => {
            typed(&kind, payload, |votes| ServerEvent::WerewolfVoteUpdate { votes })
        }
        "VOTE_RESULT" => typed(&kind, payload, ServerEvent::VoteResult),
        "SEER_RESULT" => typed(&kind, payload, |checked| ServerEvent::SeerResult { checked }),
        "SHERIFF_ELECTION" => typed(&kind, payload, ServerEvent::SheriffElection),
        "GAME_EVENT" => typed(&kind, payload, |p: GameEventPayload| ServerEvent::GameEvent {
            message: p.message,
        }),
        "PLAYER_DISCONNECTED" => {
            typed(&kind, payload, |p: PlayerRefPayload| ServerEvent::PlayerDisconnected {
                player_id: p.player_id,
            })
        }
        "WEREWOLF_PANEL" => typed(&kind, payload, |ctx| {
            ServerEvent::Panel(PanelGrant::Werewolf(ctx))
        }),
        "WITCH_PANEL" => typed(&kind, payload, |ctx| ServerEvent::Panel(PanelGrant::Witch(ctx))),
        "SEER_PANEL" => typed(&kind, payload, |ctx| ServerEvent::Panel(PanelGrant::Seer(ctx))),
        "GUARD_PANEL" => typed(&kind, payload, |ctx| ServerEvent::Panel(PanelGrant::Guard(ctx))),
        "GAME_OVER" => typed(&kind, payload, ServerEvent::GameOver),
        _ => Err((kind, payload)),
    };

    Ok(match decoded {
        Ok(event) => event,
        Err((kind, payload)) => ServerEvent::Unknown { kind, payload },
    })
}

#[derive(Deserialize)]
struct GameEventPayload {
    message: String,
}

#[derive(Deserialize)]
struct PlayerRefPayload {
    player_id: String,
}

/// Decodes a known envelope type's payload, falling back to the raw value
/// when the shape does not match. The mismatch is logged; it is never fatal.
fn typed<T, F>(kind: &str, payload: Value, build: F) -> Result<ServerEvent, (String, Value)>
where
    T: DeserializeOwned,
    F: FnOnce(T) -> ServerEvent,
{
    match serde_json::from_value::<T>(payload.clone()) {
        Ok(decoded) => Ok(build(decoded)),
        Err(source) => {
            let err = ProtocolError::UnexpectedPayload {
                kind: kind.to_string(),
                source,
            };
            warn!(target = LOG_TARGET, error = %err, "payload shape mismatch");
            Err((kind.to_string(), payload))
        }
    }
}
