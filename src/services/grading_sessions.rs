use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::services::answer_key::AnswerKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct StoredAnswerKey {
    pub(crate) source_path: PathBuf,
    pub(crate) key: AnswerKey,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradingSession {
    pub(crate) id: Uuid,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) answer_key: Option<StoredAnswerKey>,
}

/// In-memory grading sessions, each holding its own answer key.
#[derive(Clone)]
pub(crate) struct GradingSessions {
    sessions: Arc<RwLock<HashMap<Uuid, GradingSession>>>,
    ttl: Duration,
}

impl GradingSessions {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    pub(crate) async fn create(&self) -> GradingSession {
        let now = OffsetDateTime::now_utc();
        let purged = self.purge_expired(now).await;
        if purged > 0 {
            tracing::info!(purged, "Expired grading sessions removed");
        }

        let session = GradingSession { id: Uuid::new_v4(), created_at: now, answer_key: None };
        self.sessions.write().await.insert(session.id, session.clone());
        tracing::debug!(session_id = %session.id, "Grading session created");
        session
    }

    pub(crate) async fn get(&self, id: Uuid) -> Option<GradingSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Replaces the session's answer key; `None` when the session does not exist.
    pub(crate) async fn set_answer_key(
        &self,
        id: Uuid,
        answer_key: StoredAnswerKey,
    ) -> Option<GradingSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id)?;
        session.answer_key = Some(answer_key);
        Some(session.clone())
    }

    pub(crate) async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub(crate) async fn purge_expired(&self, now: OffsetDateTime) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| now - session.created_at < self.ttl);
        before - sessions.len()
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
