//! Bearer token table.
//!
//! Tokens move through `Issued -> Validated -> Consumed -> Invalidated`.
//! The consumed flag is an `AtomicBool` flipped with compare-and-set, so the
//! one-time-use decision for a token is made by exactly one caller while the
//! table itself is only read-locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult, TokenRejection};

/// Longest token string accepted before it is treated as malformed.
pub const MAX_TOKEN_LEN: usize = 512;

/// Snapshot of a token's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    #[serde(skip_serializing)]
    pub token: String,
    pub user_identity: String,
    pub remote_origin: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub session_created: bool,
}

impl TokenDetails {
    pub fn new(
        token: impl Into<String>,
        user_identity: impl Into<String>,
        remote_origin: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        let issued_at = Utc::now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token: token.into(),
            user_identity: user_identity.into(),
            remote_origin: remote_origin.into(),
            issued_at,
            expires_at,
            session_created: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

struct TokenEntry {
    user_identity: String,
    remote_origin: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    session_created: AtomicBool,
}

impl TokenEntry {
    fn snapshot(&self, token: &str) -> TokenDetails {
        TokenDetails {
            token: token.to_string(),
            user_identity: self.user_identity.clone(),
            remote_origin: self.remote_origin.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            session_created: self.session_created.load(Ordering::Acquire),
        }
    }
}

/// Check the shape of a bearer token without looking it up.
pub fn check_token_format(token: &str) -> SessionResult<()> {
    if token.is_empty()
        || token.len() > MAX_TOKEN_LEN
        || token.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(SessionError::invalid(TokenRejection::Malformed));
    }
    Ok(())
}

/// Owns every outstanding bearer token.
///
/// Tokens are put here by the issuance side ([`TokenStore::insert`] or
/// [`TokenStore::issue`]); the session manager only validates, consumes and
/// invalidates them.
///
/// A store built with [`TokenStore::with_capacity`] never holds more than
/// `capacity` tokens. Adding a new token to a full table evicts the oldest
/// evictable one, or fails with [`SessionError::TokenCapacityExceeded`] when
/// nothing may be evicted.
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, TokenEntry>>,
    capacity: Option<usize>,
}

impl TokenStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: RwLock::default(),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TokenEntry>> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TokenEntry>> {
        self.tokens.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a token handed over by the issuance side. Replaces any previous
    /// entry under the same token string.
    ///
    /// When the table is full the oldest token that has not created a
    /// session yet is evicted to make room.
    pub fn insert(&self, details: TokenDetails) -> SessionResult<Option<TokenDetails>> {
        self.insert_evicting(details, |_, session_created| !session_created)
    }

    /// Like [`TokenStore::insert`], with the caller deciding which tokens may
    /// be evicted. `evictable` gets each token and its consumed flag.
    ///
    /// Returns the evicted token, if one had to go.
    pub fn insert_evicting<F>(
        &self,
        details: TokenDetails,
        evictable: F,
    ) -> SessionResult<Option<TokenDetails>>
    where
        F: Fn(&str, bool) -> bool,
    {
        let mut tokens = self.write();

        let mut evicted = None;
        if let Some(capacity) = self.capacity {
            if !tokens.contains_key(&details.token) && tokens.len() >= capacity {
                let victim = tokens
                    .iter()
                    .filter(|(token, entry)| {
                        evictable(token, entry.session_created.load(Ordering::Acquire))
                    })
                    .min_by_key(|(_, entry)| entry.issued_at)
                    .map(|(token, _)| token.clone())
                    .ok_or(SessionError::TokenCapacityExceeded { capacity })?;
                evicted = tokens
                    .remove(&victim)
                    .map(|entry| entry.snapshot(&victim));
            }
        }

        let entry = TokenEntry {
            user_identity: details.user_identity,
            remote_origin: details.remote_origin,
            issued_at: details.issued_at,
            expires_at: details.expires_at,
            session_created: AtomicBool::new(details.session_created),
        };
        tokens.insert(details.token, entry);
        Ok(evicted)
    }

    /// Mint a random token for `user_identity` valid for `ttl`.
    pub fn issue(
        &self,
        user_identity: &str,
        remote_origin: &str,
        ttl: Duration,
    ) -> SessionResult<TokenDetails> {
        let details = Self::mint(user_identity, remote_origin, ttl);
        self.insert(details.clone())?;
        Ok(details)
    }

    /// A fresh random token that is not in any table yet.
    pub(crate) fn mint(user_identity: &str, remote_origin: &str, ttl: Duration) -> TokenDetails {
        TokenDetails::new(
            Uuid::new_v4().simple().to_string(),
            user_identity,
            remote_origin,
            ttl,
        )
    }

    /// Look up a token and check its validity window.
    pub fn validate(&self, token: &str) -> SessionResult<TokenDetails> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> SessionResult<TokenDetails> {
        check_token_format(token)?;
        let tokens = self.read();
        let entry = tokens
            .get(token)
            .ok_or(SessionError::invalid(TokenRejection::Unknown))?;
        if now >= entry.expires_at {
            return Err(SessionError::invalid(TokenRejection::Expired));
        }
        Ok(entry.snapshot(token))
    }

    /// Flip the token's `session_created` flag.
    ///
    /// Only the first caller for a given token succeeds; everyone after it
    /// gets [`SessionError::TokenAlreadyConsumed`].
    pub fn mark_consumed(&self, token: &str) -> SessionResult<()> {
        let tokens = self.read();
        let entry = tokens
            .get(token)
            .ok_or(SessionError::invalid(TokenRejection::Unknown))?;
        entry
            .session_created
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SessionError::TokenAlreadyConsumed)
    }

    /// Whether the token is still present, regardless of expiry.
    pub fn contains(&self, token: &str) -> bool {
        self.read().contains_key(token)
    }

    /// Remove a token. Returns true if it was present.
    pub fn invalidate(&self, token: &str) -> bool {
        self.write().remove(token).is_some()
    }

    /// Drop every token whose validity window ended at or before `now`.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> Vec<TokenDetails> {
        let mut tokens = self.write();
        let expired: Vec<String> = tokens
            .iter()
            .filter(|(_, entry)| now >= entry.expires_at)
            .map(|(token, _)| token.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|token| tokens.remove(&token).map(|entry| entry.snapshot(&token)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    const HOUR: Duration = Duration::from_secs(3600);

    fn store_with(token: &str) -> TokenStore {
        let store = TokenStore::new();
        store
            .insert(TokenDetails::new(token, "alice", "10.0.0.1:5000", HOUR))
            .unwrap();
        store
    }

    mod format {
        use super::*;

        #[test]
        fn accepts_plain_tokens() {
            assert!(check_token_format("abc123").is_ok());
        }

        #[test]
        fn rejects_empty() {
            assert_eq!(
                check_token_format(""),
                Err(SessionError::invalid(TokenRejection::Malformed))
            );
        }

        #[test]
        fn rejects_whitespace_and_control() {
            assert!(check_token_format("abc def").is_err());
            assert!(check_token_format("abc\n").is_err());
            assert!(check_token_format("abc\u{7}").is_err());
        }

        #[test]
        fn rejects_oversized() {
            let token = "a".repeat(MAX_TOKEN_LEN + 1);
            assert!(check_token_format(&token).is_err());
            assert!(check_token_format(&"a".repeat(MAX_TOKEN_LEN)).is_ok());
        }
    }

    mod validate {
        use super::*;

        #[test]
        fn returns_details_for_known_token() {
            let store = store_with("tok-1");
            let details = store.validate("tok-1").unwrap();
            assert_eq!(details.token, "tok-1");
            assert_eq!(details.user_identity, "alice");
            assert_eq!(details.remote_origin, "10.0.0.1:5000");
            assert!(!details.session_created);
        }

        #[test]
        fn unknown_token_is_invalid() {
            let store = TokenStore::new();
            assert_eq!(
                store.validate("nope"),
                Err(SessionError::invalid(TokenRejection::Unknown))
            );
        }

        #[test]
        fn malformed_token_is_invalid() {
            let store = store_with("tok-1");
            assert_eq!(
                store.validate("tok 1"),
                Err(SessionError::invalid(TokenRejection::Malformed))
            );
        }

        #[test]
        fn expired_token_is_invalid() {
            let store = store_with("tok-1");
            let later = Utc::now() + chrono::Duration::hours(2);
            assert_eq!(
                store.validate_at("tok-1", later),
                Err(SessionError::invalid(TokenRejection::Expired))
            );
        }

        #[test]
        fn validate_does_not_consume() {
            let store = store_with("tok-1");
            store.validate("tok-1").unwrap();
            assert!(!store.validate("tok-1").unwrap().session_created);
        }
    }

    mod consume {
        use super::*;

        #[test]
        fn first_mark_succeeds_second_fails() {
            let store = store_with("tok-1");
            assert!(store.mark_consumed("tok-1").is_ok());
            assert!(store.validate("tok-1").unwrap().session_created);
            assert_eq!(
                store.mark_consumed("tok-1"),
                Err(SessionError::TokenAlreadyConsumed)
            );
        }

        #[test]
        fn mark_unknown_is_invalid() {
            let store = TokenStore::new();
            assert_eq!(
                store.mark_consumed("ghost"),
                Err(SessionError::invalid(TokenRejection::Unknown))
            );
        }

        #[test]
        fn concurrent_marks_have_single_winner() {
            let store = Arc::new(store_with("tok-race"));
            let threads = 16;
            let barrier = Arc::new(Barrier::new(threads));

            let winners = std::thread::scope(|s| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let store = Arc::clone(&store);
                        let barrier = Arc::clone(&barrier);
                        s.spawn(move || {
                            barrier.wait();
                            store.mark_consumed("tok-race").is_ok()
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|won| *won)
                    .count()
            });

            assert_eq!(winners, 1);
        }
    }

    mod invalidate {
        use super::*;

        #[test]
        fn removes_token() {
            let store = store_with("tok-1");
            assert!(store.invalidate("tok-1"));
            assert_eq!(
                store.validate("tok-1"),
                Err(SessionError::invalid(TokenRejection::Unknown))
            );
            assert!(store.is_empty());
        }

        #[test]
        fn absent_token_is_noop() {
            let store = TokenStore::new();
            assert!(!store.invalidate("tok-1"));
        }
    }

    mod issue {
        use super::*;

        #[test]
        fn issued_tokens_are_unique_and_valid() {
            let store = TokenStore::new();
            let a = store.issue("alice", "127.0.0.1:1", HOUR).unwrap();
            let b = store.issue("alice", "127.0.0.1:1", HOUR).unwrap();
            assert_ne!(a.token, b.token);
            assert!(check_token_format(&a.token).is_ok());
            assert_eq!(store.validate(&a.token).unwrap(), a);
            assert_eq!(store.len(), 2);
        }

        #[test]
        fn huge_ttl_does_not_overflow() {
            let details = TokenDetails::new("t", "u", "o", Duration::from_secs(u64::MAX));
            assert!(!details.is_expired_at(Utc::now()));
        }
    }

    mod expiry {
        use super::*;

        #[test]
        fn remove_expired_only_drops_stale_tokens() {
            let store = TokenStore::new();
            store
                .insert(TokenDetails::new("short", "u", "o", Duration::from_secs(60)))
                .unwrap();
            store
                .insert(TokenDetails::new("long", "u", "o", Duration::from_secs(7200)))
                .unwrap();

            let now = Utc::now() + chrono::Duration::minutes(5);
            let removed = store.remove_expired(now);

            assert_eq!(removed.len(), 1);
            assert_eq!(removed[0].token, "short");
            assert!(store.validate("long").is_ok());
            assert_eq!(store.len(), 1);
        }

        #[test]
        fn remove_expired_reports_consumed_flag() {
            let store = TokenStore::new();
            store
                .insert(TokenDetails::new("t", "u", "o", Duration::from_secs(1)))
                .unwrap();
            store.mark_consumed("t").unwrap();

            let removed = store.remove_expired(Utc::now() + chrono::Duration::minutes(1));
            assert_eq!(removed.len(), 1);
            assert!(removed[0].session_created);
        }
    }

    mod capacity {
        use super::*;

        fn aged(token: &str, age_secs: i64) -> TokenDetails {
            let mut details = TokenDetails::new(token, "u", "o", HOUR);
            details.issued_at = details.issued_at - chrono::Duration::seconds(age_secs);
            details
        }

        #[test]
        fn unbounded_store_has_no_capacity() {
            assert_eq!(TokenStore::new().capacity(), None);
            assert_eq!(TokenStore::with_capacity(3).capacity(), Some(3));
        }

        #[test]
        fn full_table_evicts_oldest_unconsumed_token() {
            let store = TokenStore::with_capacity(2);
            store.insert(aged("old", 20)).unwrap();
            store.insert(aged("mid", 10)).unwrap();

            let evicted = store.insert(aged("new", 0)).unwrap();
            assert_eq!(evicted.map(|d| d.token), Some("old".to_string()));
            assert_eq!(store.len(), 2);
            assert!(!store.contains("old"));
            assert!(store.contains("mid"));
            assert!(store.contains("new"));
        }

        #[test]
        fn consumed_tokens_are_not_evicted_by_default() {
            let store = TokenStore::with_capacity(2);
            store.insert(aged("live", 20)).unwrap();
            store.mark_consumed("live").unwrap();
            store.insert(aged("pending", 10)).unwrap();

            let evicted = store.insert(aged("new", 0)).unwrap();
            assert_eq!(evicted.map(|d| d.token), Some("pending".to_string()));
            assert!(store.contains("live"));
        }

        #[test]
        fn full_table_of_consumed_tokens_rejects_new_token() {
            let store = TokenStore::with_capacity(1);
            store.insert(aged("live", 0)).unwrap();
            store.mark_consumed("live").unwrap();

            assert_eq!(
                store.insert(aged("new", 0)),
                Err(SessionError::TokenCapacityExceeded { capacity: 1 })
            );
            assert!(store.issue("u", "o", HOUR).is_err());
            assert_eq!(store.len(), 1);
            assert!(store.contains("live"));
        }

        #[test]
        fn caller_decides_what_is_evictable() {
            let store = TokenStore::with_capacity(2);
            store.insert(aged("keep", 20)).unwrap();
            store.insert(aged("drop", 10)).unwrap();

            let evicted = store
                .insert_evicting(aged("new", 0), |token, _| token != "keep")
                .unwrap();
            assert_eq!(evicted.map(|d| d.token), Some("drop".to_string()));
            assert!(store.contains("keep"));
        }

        #[test]
        fn replacing_existing_token_does_not_evict() {
            let store = TokenStore::with_capacity(2);
            store.insert(aged("a", 20)).unwrap();
            store.insert(aged("b", 10)).unwrap();

            assert_eq!(store.insert(aged("a", 0)).unwrap(), None);
            assert!(store.contains("b"));
            assert_eq!(store.len(), 2);
        }

        #[test]
        fn repeated_issuance_stays_within_capacity() {
            let store = TokenStore::with_capacity(3);
            for _ in 0..500 {
                store.issue("anyone", "o", HOUR).unwrap();
            }
            assert_eq!(store.len(), 3);
        }
    }
}
