// Stream session registry
//
// Tracks active response sessions and their cancellation channels so the
// user can stop a reply mid-delivery.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::services::ai::error::{AiError, AiResult};

/// Active sessions (session_id -> cancel sender)
pub struct StreamSessionManager {
    sessions: Arc<RwLock<HashMap<String, mpsc::Sender<()>>>>,
}

impl Default for StreamSessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new session. Returns (session_id, cancel_receiver).
    pub async fn create_session(&self) -> (String, mpsc::Receiver<()>) {
        let session_id = format!("stream_{}", Uuid::new_v4().simple());
        let (cancel_tx, cancel_rx) = mpsc::channel(1);

        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), cancel_tx);

        (session_id, cancel_rx)
    }

    /// Signal cancellation and drop the session
    pub async fn cancel_session(&self, session_id: &str) -> AiResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(cancel_tx) = sessions.remove(session_id) {
            let _ = cancel_tx.send(()).await;
            Ok(())
        } else {
            Err(AiError::Provider(format!("session not found: {session_id}")))
        }
    }

    /// Drop a session once delivery finishes
    pub async fn remove_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }

    pub async fn session_exists(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(session_id)
    }

    pub async fn active_session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}
