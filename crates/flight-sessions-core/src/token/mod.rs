//! Bearer tokens that gate session creation.

mod store;

pub use store::{check_token_format, TokenDetails, TokenStore, MAX_TOKEN_LEN};

/// Short, log-safe form of a bearer token.
pub fn redact_token(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    if prefix.len() < token.len() {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
