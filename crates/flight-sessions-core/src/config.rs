//! Service configuration.
//!
//! Loaded from a JSON file. Every field is optional in the file and falls
//! back to its default, so an empty `{}` is a valid config.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MAX_SESSIONS: usize = 100;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 8470;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionsConfig {
    /// Hard cap on concurrently open sessions.
    pub max_sessions: usize,
    /// Hard cap on outstanding bearer tokens. Defaults to `max_sessions`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Lifetime of a freshly issued bearer token.
    pub token_ttl_secs: u64,
    /// How often expired tokens are swept.
    pub reap_interval_secs: u64,
    pub host: String,
    pub port: u16,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_tokens: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl SessionsConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: SessionsConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "maxSessions must be at least 1".to_string(),
            ));
        }
        if self.token_capacity() < self.max_sessions {
            return Err(ConfigError::Invalid(
                "maxTokens must be at least maxSessions".to_string(),
            ));
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "tokenTtlSecs must be at least 1".to_string(),
            ));
        }
        if self.reap_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reapIntervalSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Effective size of the token table.
    pub fn token_capacity(&self) -> usize {
        self.max_tokens.unwrap_or(self.max_sessions)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}
