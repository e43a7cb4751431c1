// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Local event bus.
//!
//! Lifecycle, channel and message events raised inside the SDK are
//! broadcast to any number of subscribers. Publishing never blocks and
//! never fails; subscribers that fall behind observe `Lagged`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Raised when the application enters the foreground after being closed.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationStartEvent {
    pub start_timestamp: DateTime<Utc>,
    pub opened_from_notification: bool,
    /// Host-provided launch context (for example the notification that
    /// opened the app).
    pub launch_data: Option<Value>,
}

/// Raised once per session when the background grace window expires.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationStopEvent {
    pub start_timestamp: DateTime<Utc>,
    pub stop_timestamp: DateTime<Utc>,
    pub opened_from_notification: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalEvent {
    ApplicationStarted(ApplicationStartEvent),
    ApplicationStopped(ApplicationStopEvent),
    ChannelConnected,
    ChannelDisconnected,
    SyncCompleted { sent: usize, received: usize },
    SyncFailed { error: String },
    /// The pending queue could not be rewritten after a round. The store may
    /// still hold sent notifications until the next successful write.
    QueuePersistFailed { error: String },
    MessageRead { message_id: String },
    MessageDeleted { message_id: String },
}

/// Broadcast event stream handed to subscribers.
pub type EventStream = broadcast::Receiver<LocalEvent>;

/// Fan-out bus for [`LocalEvent`]s. Cloning shares the bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LocalEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> EventStream {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers.
    pub fn publish(&self, event: LocalEvent) {
        tracing::trace!(?event, "publishing local event");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
