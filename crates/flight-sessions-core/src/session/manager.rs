//! SessionManager - maps bearer tokens to live sessions exactly once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::factory::{DefaultSessionFactory, SessionFactory};
use super::registry::SessionRegistry;
use super::state::Session;
use crate::config::{SessionsConfig, DEFAULT_MAX_SESSIONS, DEFAULT_TOKEN_TTL_SECS};
use crate::error::{SessionError, SessionResult, TokenRejection};
use crate::event_bus::{EventBus, LifecycleEvent, LifecycleKind};
use crate::token::{redact_token, TokenDetails, TokenStore};

/// Point-in-time pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub used: usize,
    pub tokens: usize,
}

/// Builder for a [`SessionManager`].
pub struct SessionManagerBuilder {
    capacity: usize,
    token_capacity: Option<usize>,
    token_ttl: Duration,
    tokens: Option<Arc<TokenStore>>,
    factory: Option<Arc<dyn SessionFactory>>,
    events: Option<Arc<EventBus>>,
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAX_SESSIONS,
            token_capacity: None,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            tokens: None,
            factory: None,
            events: None,
        }
    }
}

impl SessionManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of concurrently registered sessions.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Maximum number of outstanding tokens. Defaults to the session
    /// capacity. Ignored when an existing store is passed to
    /// [`Self::token_store`].
    pub fn token_capacity(mut self, capacity: usize) -> Self {
        self.token_capacity = Some(capacity);
        self
    }

    /// Lifetime of tokens minted through [`SessionManager::issue_token`].
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Use an existing TokenStore (shared with an issuance service).
    pub fn token_store(mut self, tokens: Arc<TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn SessionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            tokens: self.tokens.unwrap_or_else(|| {
                Arc::new(TokenStore::with_capacity(
                    self.token_capacity.unwrap_or(self.capacity),
                ))
            }),
            registry: SessionRegistry::new(self.capacity),
            factory: self
                .factory
                .unwrap_or_else(|| Arc::new(DefaultSessionFactory)),
            events: self.events.unwrap_or_default(),
            token_ttl: self.token_ttl,
        }
    }
}

/// Owns the token table and the session pool for one running service.
///
/// Constructed at startup and shared (behind an `Arc`) by every RPC handler.
/// Unrelated identities never wait on each other during creation: the
/// exclusivity point is the per-token consumed flag, not a pool-wide lock.
pub struct SessionManager {
    tokens: Arc<TokenStore>,
    registry: SessionRegistry,
    factory: Arc<dyn SessionFactory>,
    events: Arc<EventBus>,
    token_ttl: Duration,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::builder()
            .capacity(config.max_sessions)
            .token_capacity(config.token_capacity())
            .token_ttl(config.token_ttl())
            .build()
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Mint a token for `user_identity` connecting from `remote_origin`.
    ///
    /// On a full token table the oldest token without a registered session
    /// is evicted. Fails with [`SessionError::TokenCapacityExceeded`] when
    /// every outstanding token backs a live session.
    pub fn issue_token(
        &self,
        user_identity: &str,
        remote_origin: &str,
    ) -> SessionResult<TokenDetails> {
        let details = TokenStore::mint(user_identity, remote_origin, self.token_ttl);
        let evicted = self
            .tokens
            .insert_evicting(details.clone(), |token, _| {
                self.registry.lookup(token).is_none()
            })
            .map_err(|err| {
                log::warn!(
                    "Refused bearer token for user '{}' from {}: {}",
                    user_identity,
                    remote_origin,
                    err
                );
                err
            })?;
        if let Some(evicted) = evicted {
            log::info!(
                "Token table full, evicted bearer token {} of user '{}'",
                redact_token(&evicted.token),
                evicted.user_identity
            );
        }
        log::info!(
            "Issued bearer token {} for user '{}' from {}",
            redact_token(&details.token),
            user_identity,
            remote_origin
        );
        Ok(details)
    }

    /// Return the session registered under `identity`, if any.
    ///
    /// A hit refreshes the session's activity clock and never consults the
    /// token store.
    pub fn lookup(&self, identity: &str) -> Option<Arc<Session>> {
        let session = self.registry.lookup(identity)?;
        session.touch();
        Some(session)
    }

    /// Existing session for `identity`, or a new one via [`Self::create`].
    pub fn get_or_create(&self, identity: &str) -> SessionResult<Arc<Session>> {
        if let Some(session) = self.lookup(identity) {
            log::debug!(
                "Reusing session {} for token {}",
                session.id,
                redact_token(identity)
            );
            return Ok(session);
        }
        self.create(identity)
    }

    /// Run the create-once protocol for `identity`.
    ///
    /// The token is marked consumed before registration is attempted, so a
    /// registration that fails (pool full) still burns the token and the
    /// client has to reconnect with a new one.
    ///
    /// A panic anywhere in the protocol is caught here and reported as
    /// [`SessionError::Internal`].
    pub fn create(&self, identity: &str) -> SessionResult<Arc<Session>> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.try_create(identity)))
            .unwrap_or_else(|_| {
                Err(SessionError::Internal(
                    "session creation panicked".to_string(),
                ))
            });
        match outcome {
            Ok(session) => Ok(session),
            Err(err) => {
                let used = self.registry.current_count();
                match &err {
                    SessionError::Internal(message) => log::warn!(
                        "Session creation failed for token {}: {} (pool {}/{})",
                        redact_token(identity),
                        message,
                        used,
                        self.registry.capacity()
                    ),
                    other => log::info!(
                        "Session creation rejected for token {}: {}",
                        redact_token(identity),
                        other
                    ),
                }
                self.events.emit(
                    LifecycleEvent::new(LifecycleKind::Rejected, redact_token(identity), used)
                        .with_reason(err.code()),
                );
                Err(err)
            }
        }
    }

    fn try_create(&self, identity: &str) -> SessionResult<Arc<Session>> {
        let details = self.tokens.validate(identity)?;
        if details.session_created {
            return Err(SessionError::TokenAlreadyConsumed);
        }
        // Losers of a concurrent race on the same token fail here.
        self.tokens.mark_consumed(identity)?;

        let session = Arc::new(self.factory.build(
            &details.token,
            &details.user_identity,
            &details.remote_origin,
        )?);

        if let Err(err) = self.registry.register(identity, Arc::clone(&session)) {
            session.set_error(err.to_string());
            return Err(err);
        }

        // A close that ran between validation and registration has already
        // invalidated the token; tear the session down instead of leaking it.
        if !self.tokens.contains(identity) {
            self.registry.deregister(identity);
            session.set_error("token invalidated while the session was being created");
            return Err(SessionError::invalid(TokenRejection::Unknown));
        }

        let used = self.registry.current_count();
        log::info!(
            "Created session {} for user '{}' from {} (pool {}/{})",
            session.id,
            session.user_identity,
            session.remote_origin,
            used,
            self.registry.capacity()
        );
        self.events.emit(LifecycleEvent::new(
            LifecycleKind::Created,
            redact_token(identity),
            used,
        ));
        Ok(session)
    }

    /// Tear down whatever exists for `identity`. Never fails.
    ///
    /// The token goes first so a racing create cannot pass validation after
    /// the session is gone.
    pub fn close(&self, identity: &str) {
        let had_token = self.tokens.invalidate(identity);
        let removed = self.registry.deregister(identity);

        match removed {
            Some(session) => {
                let used = self.registry.current_count();
                log::info!(
                    "Closed session {} for user '{}' (pool {}/{})",
                    session.id,
                    session.user_identity,
                    used,
                    self.registry.capacity()
                );
                self.events.emit(LifecycleEvent::new(
                    LifecycleKind::Closed,
                    redact_token(identity),
                    used,
                ));
            }
            None if had_token => {
                log::debug!("Invalidated token {} with no session", redact_token(identity))
            }
            None => {}
        }
    }

    /// Drop expired tokens and the sessions created under them.
    ///
    /// Returns how many tokens were removed.
    pub fn reap_expired(&self) -> usize {
        self.reap_expired_at(Utc::now())
    }

    pub fn reap_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired = self.tokens.remove_expired(now);
        for details in &expired {
            let session = self.registry.deregister(&details.token);
            let used = self.registry.current_count();
            if let Some(session) = &session {
                log::info!(
                    "Token expired, closed session {} for user '{}' (pool {}/{})",
                    session.id,
                    session.user_identity,
                    used,
                    self.registry.capacity()
                );
            }
            self.events.emit(LifecycleEvent::new(
                LifecycleKind::TokenExpired,
                redact_token(&details.token),
                used,
            ));
        }
        expired.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.registry.capacity(),
            used: self.registry.current_count(),
            tokens: self.tokens.len(),
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::builder().build()
    }
}
