//! Session acquisition, credential persistence, and the persistent
//! connection lifecycle.

pub mod connection;
pub mod join;
pub mod token_store;

pub use connection::{ConnectionHandle, SessionEvent};
pub use join::{JoinAs, JoinClient, SessionCredentials};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{JoinError, TransportError};

const LOG_TARGET: &str = "session";

/// Owns the join flow, the stored credential, and at most one live
/// connection at a time. The connection handle's lifetime is tied to room
/// membership, never to the process.
pub struct SessionManager {
    config: ClientConfig,
    join: JoinClient,
    tokens: Arc<dyn TokenStore>,
    active: Option<connection::ActiveConnection>,
}

impl SessionManager {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let join = JoinClient::new(config.http_base.clone());
        Self {
            config,
            join,
            tokens,
            active: None,
        }
    }

    pub fn join_client(&self) -> &JoinClient {
        &self.join
    }

    /// Resumes the stored credential for this room, or performs a fresh join
    /// and stores the result. Join failures propagate; they are never retried
    /// here.
    pub async fn acquire_session(
        &self,
        room_id: &str,
        join_as: &JoinAs,
    ) -> Result<SessionCredentials, JoinError> {
        if let Some(credentials) = self.tokens.load(room_id) {
            debug!(target = LOG_TARGET, room_id, "resuming stored session token");
            return Ok(credentials);
        }
        let credentials = self.join.join(room_id, join_as).await?;
        self.tokens.store(room_id, &credentials);
        Ok(credentials)
    }

    /// Opens the persistent connection, closing any previous one first so at
    /// most one is ever live. The server re-delivers a full authoritative
    /// snapshot on every fresh connection; the caller must rebuild its state
    /// from that, never assume carry-over.
    pub async fn connect(
        &mut self,
        room_id: &str,
        credentials: &SessionCredentials,
    ) -> Result<(mpsc::Receiver<SessionEvent>, ConnectionHandle), TransportError> {
        self.disconnect().await;
        let (events, active) = connection::open(&self.config, room_id, credentials).await?;
        let handle = active.handle.clone();
        self.active = Some(active);
        Ok((events, handle))
    }

    /// Cancels and joins the live connection, if any.
    pub async fn disconnect(&mut self) {
        if let Some(active) = self.active.take() {
            info!(target = LOG_TARGET, "closing connection");
            active.handle.close();
            let _ = active.task.await;
        }
    }

    /// Drops the stored credential so the next `acquire_session` joins fresh.
    pub fn forget_session(&self, room_id: &str) {
        self.tokens.forget(room_id);
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.close();
            active.task.abort();
        }
    }
}
