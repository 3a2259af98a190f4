//! Session construction.

use super::state::Session;
use crate::error::{SessionError, SessionResult};

/// Builds sessions from validated token metadata.
///
/// Implementations must not touch shared state; the manager decides whether
/// the result is ever registered.
pub trait SessionFactory: Send + Sync {
    fn build(
        &self,
        identity: &str,
        user_identity: &str,
        remote_origin: &str,
    ) -> SessionResult<Session>;
}

/// Plain in-memory construction.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSessionFactory;

impl SessionFactory for DefaultSessionFactory {
    fn build(
        &self,
        identity: &str,
        user_identity: &str,
        remote_origin: &str,
    ) -> SessionResult<Session> {
        if identity.is_empty() {
            return Err(SessionError::Internal(
                "cannot build a session without a peer identity".to_string(),
            ));
        }
        if user_identity.is_empty() {
            return Err(SessionError::Internal(
                "cannot build a session without a user identity".to_string(),
            ));
        }
        Ok(Session::new(
            identity.to_string(),
            user_identity.to_string(),
            remote_origin.to_string(),
        ))
    }
}
