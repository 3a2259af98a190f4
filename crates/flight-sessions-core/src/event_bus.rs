//! Session lifecycle broadcasting.
//!
//! The session manager publishes one [`LifecycleEvent`] per state change of
//! the pool (created, closed, rejected, token expired). Consumers such as the
//! daemon's log sink subscribe and receive every event emitted after they
//! joined.
//!
//! # Example
//!
//! ```rust
//! use flight_sessions_core::event_bus::{EventBus, LifecycleEvent, LifecycleKind};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(LifecycleEvent::new(LifecycleKind::Closed, "a1b2c3...", 0));
//!
//! // let event = rx.recv().await.unwrap();
//! # let _ = &mut rx;
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
/// Events beyond this capacity will cause slow subscribers to miss events (lag).
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleKind {
    #[serde(rename = "session:created")]
    Created,
    #[serde(rename = "session:closed")]
    Closed,
    #[serde(rename = "session:rejected")]
    Rejected,
    #[serde(rename = "token:expired")]
    TokenExpired,
}

impl LifecycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::Created => "session:created",
            LifecycleKind::Closed => "session:closed",
            LifecycleKind::Rejected => "session:rejected",
            LifecycleKind::TokenExpired => "token:expired",
        }
    }
}

/// A pool state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,

    /// Redacted bearer token of the peer.
    pub token: String,

    /// Active sessions right after the change.
    pub used: usize,

    /// Error code for rejections.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, token: impl Into<String>, used: usize) -> Self {
        Self {
            kind,
            token: token.into(),
            used,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Fan-out of lifecycle events to any number of subscribers.
///
/// Uses a tokio broadcast channel internally; emitting never blocks.
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new EventBus with specified capacity.
    ///
    /// The capacity determines how many events can be buffered before slow
    /// subscribers start missing events (experiencing lag).
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// If there are no subscribers, the event is dropped and 0 is returned.
    pub fn emit(&self, event: LifecycleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
