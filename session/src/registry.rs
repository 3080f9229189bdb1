use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::handle::SessionHandle;
use crate::{spawn_session_with_id, SessionConfig};

/// Explicit keyed factory for sessions.
///
/// One engine process per logical key: asking again for a key returns the
/// existing handle instead of spawning a competing engine. This replaces
/// any module-level shared session state: construct one registry at the
/// top of the application and inject it into consumers.
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Handle for `key`, spawning the session on first use.
    pub async fn get_or_spawn(&self, key: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(key) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have spawned it between the read and the write.
        if let Some(handle) = sessions.get(key) {
            return handle.clone();
        }

        tracing::info!(key, "spawning engine session");
        let handle = spawn_session_with_id(key.to_string(), &self.config);
        sessions.insert(key.to_string(), handle.clone());
        handle
    }

    /// Shut down and forget the session for `key`. Returns whether one
    /// existed.
    pub async fn close(&self, key: &str) -> bool {
        let handle = self.sessions.write().await.remove(key);
        match handle {
            Some(handle) => {
                handle.shutdown().await;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
