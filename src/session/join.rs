//! Join/session HTTP calls against the excluded server-side subsystem.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::GameTemplate;
use crate::error::JoinError;
use crate::state::{PlayerId, ProfileId};

const LOG_TARGET: &str = "session::join";

/// Identity to join with: an existing profile, or a bare display name the
/// server mints a profile for. Different server iterations accepted either.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum JoinAs {
    Profile { profile_id: ProfileId },
    Name { player_name: String },
}

/// The opaque per-room credential. This is the only state that persists
/// across reloads; game state itself never does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCredentials {
    pub player_id: PlayerId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct JoinClient {
    http: reqwest::Client,
    base: Url,
}

impl JoinClient {
    pub fn new(base: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
        }
    }

    /// One join request, one answer. Room-full / unknown-room / rejection all
    /// surface as typed errors for the caller to present; nothing retries.
    pub async fn join(
        &self,
        room_id: &str,
        join_as: &JoinAs,
    ) -> Result<SessionCredentials, JoinError> {
        let url = self.endpoint(&["games", room_id, "join"])?;
        let response = self.http.post(url).json(join_as).send().await?;
        let status = response.status();

        if status.is_success() {
            let credentials = response.json::<SessionCredentials>().await?;
            info!(
                target = LOG_TARGET,
                room_id,
                player_id = %credentials.player_id,
                "joined room"
            );
            return Ok(credentials);
        }

        let detail = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.detail)
            .unwrap_or_else(|_| status.to_string());

        Err(match status {
            StatusCode::NOT_FOUND => JoinError::RoomNotFound(room_id.to_string()),
            StatusCode::CONFLICT => JoinError::RoomFull(room_id.to_string()),
            _ if detail.to_ascii_lowercase().contains("full") => {
                JoinError::RoomFull(room_id.to_string())
            }
            _ => JoinError::Rejected(detail),
        })
    }

    /// The game boards the server currently offers. Template data is owned by
    /// the server; the client only displays it.
    pub async fn game_templates(&self) -> Result<Vec<GameTemplate>, JoinError> {
        let url = self.endpoint(&["game-templates"])?;
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(JoinError::rejected(format!(
                "template fetch failed: {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, JoinError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| JoinError::rejected("http base url cannot carry a path"))?
            .extend(segments);
        Ok(url)
    }
}
