// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state management.
//!
//! Holds the notifications received from clients, the server notifications
//! waiting for the next synchronization round, and the broadcast channel used
//! for unsolicited pushes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use donky_core::{OutboundNotification, ServerFrame, ServerNotification, SyncRequest, SyncResponse};

/// Default number of server notifications returned per round.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// A failure the relay answers the next synchronization with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedFailure {
    pub status: u16,
    pub message: String,
}

/// Shared relay state.
#[derive(Clone)]
pub struct ServerState {
    inner: Arc<ServerStateInner>,
}

struct ServerStateInner {
    /// Client notifications in arrival order.
    received: Mutex<Vec<OutboundNotification>>,
    /// Server notifications delivered on the next rounds.
    outbox: Mutex<VecDeque<ServerNotification>>,
    /// Failures consumed one per round before any state changes.
    failures: Mutex<VecDeque<InjectedFailure>>,
    batch_limit: usize,
    rounds: AtomicU64,
    broadcast_tx: broadcast::Sender<ServerFrame>,
}

impl ServerState {
    /// Creates an empty state returning at most `batch_limit` notifications per round.
    pub fn new(batch_limit: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        ServerState {
            inner: Arc::new(ServerStateInner {
                received: Mutex::new(Vec::new()),
                outbox: Mutex::new(VecDeque::new()),
                failures: Mutex::new(VecDeque::new()),
                batch_limit: batch_limit.max(1),
                rounds: AtomicU64::new(0),
                broadcast_tx,
            }),
        }
    }

    /// Runs one synchronization round.
    ///
    /// An injected failure is returned without recording the request, so a
    /// failed round leaves the relay exactly as it was.
    pub async fn synchronise(&self, request: SyncRequest) -> Result<SyncResponse, InjectedFailure> {
        self.inner.rounds.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.inner.failures.lock().await.pop_front() {
            debug!(status = failure.status, "answering round with injected failure");
            return Err(failure);
        }

        let count = request.client_notifications.len();
        self.inner
            .received
            .lock()
            .await
            .extend(request.client_notifications);

        let mut outbox = self.inner.outbox.lock().await;
        let take = outbox.len().min(self.inner.batch_limit);
        let server_notifications: Vec<_> = outbox.drain(..take).collect();
        debug!(
            received = count,
            delivered = server_notifications.len(),
            remaining = outbox.len(),
            "round complete"
        );
        Ok(SyncResponse {
            server_notifications,
            more_notifications_available: !outbox.is_empty(),
        })
    }

    /// Queues a notification for the next synchronization round.
    pub async fn enqueue(&self, notification: ServerNotification) {
        self.inner.outbox.lock().await.push_back(notification);
    }

    /// Pushes notifications inline to every connected client.
    ///
    /// Returns the number of clients the frame was handed to.
    pub fn push(&self, notifications: Vec<ServerNotification>) -> usize {
        self.inner
            .broadcast_tx
            .send(ServerFrame::push(notifications))
            .unwrap_or(0)
    }

    /// Announces a notification by id only.
    ///
    /// The relay has no fetch endpoint, so the notification is also queued
    /// for the next round; clients that cannot fetch it pick it up there.
    pub async fn announce(&self, notification: ServerNotification) -> usize {
        let frame = ServerFrame::pending(notification.id.clone());
        self.enqueue(notification).await;
        self.inner.broadcast_tx.send(frame).unwrap_or(0)
    }

    /// Makes the next round fail with `status`.
    pub async fn fail_next(&self, status: u16, message: impl Into<String>) {
        self.inner.failures.lock().await.push_back(InjectedFailure {
            status,
            message: message.into(),
        });
    }

    /// Client notifications received so far.
    pub async fn received(&self) -> Vec<OutboundNotification> {
        self.inner.received.lock().await.clone()
    }

    /// Number of synchronization rounds answered, failures included.
    pub fn rounds(&self) -> u64 {
        self.inner.rounds.load(Ordering::SeqCst)
    }

    /// Subscribe to broadcast frames.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerFrame> {
        self.inner.broadcast_tx.subscribe()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState::new(DEFAULT_BATCH_LIMIT)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
