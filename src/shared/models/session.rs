use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::docker::{Session, Teardown};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionRequest {
    pub browser: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: String,
    pub url: String,
    pub browser: String,
    pub version: String,
    pub created_at: String,
}

/// A running session as the HTTP layer sees it.
#[derive(Debug)]
pub struct ActiveSession {
    pub browser: String,
    pub version: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    teardown: Teardown,
}

impl ActiveSession {
    pub fn new(session: Session, browser: String, version: String) -> Self {
        Self {
            browser,
            version,
            url: session.url().to_string(),
            created_at: Utc::now(),
            teardown: session.into_teardown(),
        }
    }

    pub fn id(&self) -> &str {
        self.teardown.container_id()
    }

    pub fn to_response(&self) -> SessionResponse {
        SessionResponse {
            id: self.id().to_string(),
            url: self.url.clone(),
            browser: self.browser.clone(),
            version: self.version.clone(),
            created_at: self.created_at.to_rfc3339(),
        }
    }

    pub fn into_teardown(self) -> Teardown {
        self.teardown
    }
}

/// In-memory index of live sessions, keyed by container id. The lock is only
/// held for map operations, never across runtime calls.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ActiveSession>>,
}

impl SessionRegistry {
    pub fn insert(&self, session: ActiveSession) -> SessionResponse {
        let response = session.to_response();
        self.lock().insert(response.id.clone(), session);
        response
    }

    pub fn remove(&self, id: &str) -> Option<ActiveSession> {
        self.lock().remove(id)
    }

    pub fn list(&self) -> Vec<SessionResponse> {
        let mut sessions: Vec<_> = self.lock().values().map(ActiveSession::to_response).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Empties the registry, handing back every session still in it.
    pub fn drain(&self) -> Vec<ActiveSession> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveSession>> {
        // a panicked holder cannot leave the map half-updated
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
