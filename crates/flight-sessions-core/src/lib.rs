//! # flight-sessions-core
//!
//! Session lifecycle for a bearer-token-authenticated SQL front-end.
//!
//! This crate is transport-agnostic and can be used by:
//! - the HTTP front-end (`flight-sessions-http`)
//! - any other RPC layer that hands over a peer token per call
//!
//! ## Key Concepts
//!
//! - **Token**: an opaque bearer string that may seed at most one session
//! - **Session**: the execution context bound to one client connection
//! - **Pool**: the bounded set of concurrently active sessions

pub mod config;
pub mod error;
pub mod event_bus;
pub mod session;
pub mod token;

// Re-export commonly used types
pub use config::SessionsConfig;
pub use error::{ErrorClass, SessionError, SessionResult, TokenRejection};
pub use session::{Session, SessionId, SessionInfo, SessionManager};
pub use token::{TokenDetails, TokenStore};
