//! Session event system.
//!
//! Observers (the dashboard, `watch` output) subscribe to a broadcast of
//! [`SessionEvent`]s instead of polling session state.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use glucopatch_types::{LogEntry, Reading};

use crate::session::ConnectionState;

/// Events emitted by a session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged { state: ConnectionState },
    /// A frame decoded and was appended to the store.
    ReadingAppended { reading: Reading },
    /// A frame failed to decode and was dropped.
    DecodeFailed {
        error: String,
        raw: Option<String>,
    },
    /// A diagnostic log entry was appended.
    Log { entry: LogEntry },
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
