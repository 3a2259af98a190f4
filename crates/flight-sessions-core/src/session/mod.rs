//! Session pool and lifecycle.
//!
//! A session is created at most once per bearer token and lives in the
//! bounded [`SessionRegistry`] until the connection closes or the token
//! expires.

mod factory;
mod manager;
mod registry;
mod state;

pub use factory::{DefaultSessionFactory, SessionFactory};
pub use manager::{PoolStats, SessionManager, SessionManagerBuilder};
pub use registry::SessionRegistry;
pub use state::{ExecutionState, Session, SessionId, SessionInfo};
