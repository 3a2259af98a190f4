//! Bounded session pool.
//!
//! The active count is the map's length, so it can only change inside the
//! write section of [`SessionRegistry::register`] or
//! [`SessionRegistry::deregister`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::state::Session;
use crate::error::{SessionError, SessionResult};

/// Tracks active sessions by peer identity, up to a fixed capacity.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a session under `identity`.
    ///
    /// Returns the slot index the session took (the number of sessions that
    /// were active before it). Fails without mutating anything when the pool
    /// is full or the identity is already registered.
    pub fn register(&self, identity: &str, session: Arc<Session>) -> SessionResult<usize> {
        let mut sessions = self.write();
        if sessions.len() >= self.capacity {
            return Err(SessionError::PoolCapacityExceeded {
                capacity: self.capacity,
                used: sessions.len(),
            });
        }
        if sessions.contains_key(identity) {
            return Err(SessionError::Internal(
                "a session is already registered for this peer identity".to_string(),
            ));
        }
        let slot = sessions.len();
        sessions.insert(identity.to_string(), session);
        Ok(slot)
    }

    pub fn lookup(&self, identity: &str) -> Option<Arc<Session>> {
        self.read().get(identity).cloned()
    }

    /// Remove the session for `identity`, if any. Absent identities are not
    /// an error.
    pub fn deregister(&self, identity: &str) -> Option<Arc<Session>> {
        self.write().remove(identity)
    }

    pub fn current_count(&self) -> usize {
        self.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Peer identities of every active session.
    pub fn identities(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.read().values().cloned().collect()
    }
}
