//! Per-session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::token::redact_token;

/// Unique identifier for a session, independent of the bearer token it was
/// created under. Safe to log and hand to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable execution state. Opaque to the pool apart from the error slot
/// and the activity clock.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub error: Option<String>,
    pub last_activity: DateTime<Utc>,
}

/// Execution context bound to one authenticated client connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,

    /// Bearer token the session was created under; the pool key.
    pub identity: String,

    pub user_identity: String,

    pub remote_origin: String,

    pub created_at: DateTime<Utc>,

    state: Mutex<ExecutionState>,
}

impl Session {
    pub fn new(identity: String, user_identity: String, remote_origin: String) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            identity,
            user_identity,
            remote_origin,
            created_at: now,
            state: Mutex::new(ExecutionState {
                error: None,
                last_activity: now,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a failure on the session.
    pub fn set_error(&self, message: impl Into<String>) {
        self.state().error = Some(message.into());
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    /// Refresh the activity clock.
    pub fn touch(&self) {
        self.state().last_activity = Utc::now();
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.state().last_activity
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.state();
        SessionInfo {
            session_id: self.id.clone(),
            token: redact_token(&self.identity),
            user_identity: self.user_identity.clone(),
            remote_origin: self.remote_origin.clone(),
            created_at: self.created_at,
            last_activity: state.last_activity,
            error: state.error.clone(),
        }
    }
}

/// Serializable view of a session, with the bearer token redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub token: String,
    pub user_identity: String,
    pub remote_origin: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
