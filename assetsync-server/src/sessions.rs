//! Per-connection sessions
//!
//! A session is minted when a WebSocket connects and carries the
//! [`ProjectContext`] its HTTP commands run against.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use assetsync_core::ProjectContext;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Server-side state of one live connection
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub context: ProjectContext,
    pub last_activity: Instant,
}

impl Session {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Random id for a new connection
    pub fn mint_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Register a session starting from `context`
    pub async fn create_session(&self, id: impl Into<String>, context: ProjectContext) -> Session {
        let session = Session {
            id: id.into(),
            context,
            last_activity: Instant::now(),
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        tracing::debug!("Session {} created", session.id);
        session
    }

    /// Look up a session, refreshing its activity timestamp
    pub async fn get_session(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.touch();
        Some(session.clone())
    }

    /// Replace a session's context; returns false for unknown ids
    pub async fn update_session(&self, id: &str, context: ProjectContext) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.context = context;
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Refresh a session's activity timestamp without reading it
    pub async fn touch_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    pub async fn remove_session(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            tracing::debug!("Session {} removed", id);
        }
        removed
    }

    pub async fn get_all_sessions(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Drop sessions idle for longer than `timeout`, returning their ids.
    ///
    /// Not self-scheduling; callers run it periodically.
    pub async fn cleanup_inactive_sessions(&self, timeout: Duration) -> Vec<String> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| now.duration_since(s.last_activity) > timeout)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!("Removed {} inactive sessions", expired.len());
        }
        expired
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
