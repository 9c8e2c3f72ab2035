//! Per-room session-credential persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::warn;

use crate::session::join::SessionCredentials;

const LOG_TARGET: &str = "session::tokens";

/// Stores the session credential keyed by room id so a reload can resume the
/// same player slot instead of joining as someone new.
pub trait TokenStore: Send + Sync {
    fn load(&self, room_id: &str) -> Option<SessionCredentials>;
    fn store(&self, room_id: &str, credentials: &SessionCredentials);
    fn forget(&self, room_id: &str);
}

#[derive(Default)]
pub struct MemoryTokenStore {
    inner: Mutex<HashMap<String, SessionCredentials>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self, room_id: &str) -> Option<SessionCredentials> {
        self.inner.lock().get(room_id).cloned()
    }

    fn store(&self, room_id: &str, credentials: &SessionCredentials) {
        self.inner
            .lock()
            .insert(room_id.to_string(), credentials.clone());
    }

    fn forget(&self, room_id: &str) {
        self.inner.lock().remove(room_id);
    }
}

/// Write-through JSON file store. A missing or corrupt file degrades to an
/// empty map; persistence failures are logged, never surfaced to gameplay.
pub struct FileTokenStore {
    path: PathBuf,
    cache: Mutex<HashMap<String, SessionCredentials>>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(err) => {
                    warn!(target = LOG_TARGET, error = %err, path = %path.display(), "token file unreadable; starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            cache: Mutex::new(cache),
        }
    }

    fn persist(&self, cache: &HashMap<String, SessionCredentials>) {
        match serde_json::to_string_pretty(cache) {
            Ok(raw) => {
                if let Err(err) = std::fs::write(&self.path, raw) {
                    warn!(target = LOG_TARGET, error = %err, path = %self.path.display(), "failed to persist tokens");
                }
            }
            Err(err) => {
                warn!(target = LOG_TARGET, error = %err, "failed to serialize tokens");
            }
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self, room_id: &str) -> Option<SessionCredentials> {
        self.cache.lock().get(room_id).cloned()
    }

    fn store(&self, room_id: &str, credentials: &SessionCredentials) {
        let mut cache = self.cache.lock();
        cache.insert(room_id.to_string(), credentials.clone());
        self.persist(&cache);
    }

    fn forget(&self, room_id: &str) {
        let mut cache = self.cache.lock();
        cache.remove(room_id);
        self.persist(&cache);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(token: &str) -> SessionCredentials {
        SessionCredentials {
            player_id: "p-1".to_string(),
            token: token.to_string(),
        }
    }

    #[test]
    fn memory_store_round_trips_per_room() {
        let store = MemoryTokenStore::new();
        store.store("room-1", &credentials("tok-1"));
        store.store("room-2", &credentials("tok-2"));
        assert_eq!(store.load("room-1"), Some(credentials("tok-1")));
        assert_eq!(store.load("room-2"), Some(credentials("tok-2")));
        store.forget("room-1");
        assert_eq!(store.load("room-1"), None);
        assert_eq!(store.load("room-2"), Some(credentials("tok-2")));
    }

    #[test]
    fn file_store_survives_a_reopen() {
        let path = std::env::temp_dir().join(format!("werewolf-tokens-{}.json", uuid::Uuid::new_v4()));
        {
            let store = FileTokenStore::open(&path);
            store.store("room-1", &credentials("tok-1"));
        }
        let reopened = FileTokenStore::open(&path);
        assert_eq!(reopened.load("room-1"), Some(credentials("tok-1")));
        reopened.forget("room-1");

        let reopened_again = FileTokenStore::open(&path);
        assert_eq!(reopened_again.load("room-1"), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let path = std::env::temp_dir().join(format!("werewolf-tokens-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        let store = FileTokenStore::open(&path);
        assert_eq!(store.load("room-1"), None);
        let _ = std::fs::remove_file(&path);
    }
}
