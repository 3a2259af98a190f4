//! Shared state for the HTTP server.

use flight_sessions_core::SessionManager;
use std::sync::Arc;

/// Shared state available to all HTTP handlers.
#[derive(Clone)]
pub struct SharedState {
    pub sessions: Arc<SessionManager>,
}

impl SharedState {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self { sessions }
    }
}
