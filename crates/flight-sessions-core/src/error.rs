//! Error taxonomy for session creation and teardown.
//!
//! Every failure the RPC layer can see is a [`SessionError`]. Transports map
//! it to a status with [`SessionError::class`].

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a bearer token was rejected by the token store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    /// The token was never issued, or has been invalidated.
    Unknown,
    /// The token string cannot be a bearer token at all.
    Malformed,
    /// The token's validity window has passed.
    Expired,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenRejection::Unknown => "unknown",
            TokenRejection::Malformed => "malformed",
            TokenRejection::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Invalid bearer token ({reason}), reconnect to obtain a new bearer token")]
    InvalidToken { reason: TokenRejection },

    #[error(
        "Bearer token already created a session; a bearer token can only create a session once. \
         If the session was dropped after a long idle period, reconnect to obtain a new bearer token"
    )]
    TokenAlreadyConsumed,

    #[error("Session pool is full, max connections: {capacity}, used: {used}")]
    PoolCapacityExceeded { capacity: usize, used: usize },

    #[error("Bearer token table is full ({capacity} tokens, all backing live sessions)")]
    TokenCapacityExceeded { capacity: usize },

    #[error("Internal session error: {0}")]
    Internal(String),
}

impl SessionError {
    pub fn invalid(reason: TokenRejection) -> Self {
        SessionError::InvalidToken { reason }
    }

    /// Failure class used by transports to pick a status code.
    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::InvalidToken { .. } | SessionError::TokenAlreadyConsumed => {
                ErrorClass::Unauthenticated
            }
            SessionError::PoolCapacityExceeded { .. }
            | SessionError::TokenCapacityExceeded { .. } => ErrorClass::ResourceExhausted,
            SessionError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidToken { .. } => "invalid_token",
            SessionError::TokenAlreadyConsumed => "token_already_consumed",
            SessionError::PoolCapacityExceeded { .. } => "pool_capacity_exceeded",
            SessionError::TokenCapacityExceeded { .. } => "token_capacity_exceeded",
            SessionError::Internal(_) => "internal",
        }
    }
}

/// Transport-neutral failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Unauthenticated,
    ResourceExhausted,
    Internal,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised while loading or validating [`crate::config::SessionsConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
