// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization coordinator.
//!
//! Owns the pending outbound queue and runs synchronization rounds. At most
//! one round is in flight; a request that arrives while one is running
//! marks the flight for a re-run and attaches its callback to that re-run.
//!
//! ```text
//! synchronize() ──► idle? ──yes──► spawn flight ──► round ──► deliver
//!                     │                              ▲   │
//!                     no ──► rerun_requested ────────┘   └─► more? rerun
//! ```
//!
//! Transport choice per round: the persistent channel when it is connected
//! and the coordinator is not REST-only, otherwise REST. Transient failures
//! are retried on the same transport. Once the persistent leg gives up
//! (retries spent, link closed, channel unavailable) the round falls back
//! to REST; terminal failures end the round on either transport.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use donky_core::{ClockSource, OutboundNotification, ServerNotification, SyncRequest, SyncResponse};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::channel::PushPayload;
use crate::error::SyncError;
use crate::events::{EventBus, LocalEvent};
use crate::executor::CallbackExecutor;
use crate::lifecycle::SyncTrigger;
use crate::registry::SubscriptionRegistry;
use crate::retry::{classify, Disposition, RetryPolicy};
use crate::store::{StoreError, SyncStore};
use crate::transport::{Transport, TransportError, TransportKind};

/// Follow-up rounds run back to back while the backend reports more
/// notifications, before waiting for the next trigger.
const MAX_FOLLOW_UP_ROUNDS: u32 = 10;

/// Success value of a synchronization round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Outbound notifications delivered to the backend.
    pub sent: usize,
    /// Inbound notifications received.
    pub received: usize,
    pub transport: TransportKind,
    pub completed_at: DateTime<Utc>,
    /// The backend capped the batch; a follow-up round was scheduled.
    pub more_available: bool,
}

pub type SyncResult = Result<SyncReport, SyncError>;

/// Callback receiving the terminal outcome of a `synchronize` call.
pub type SyncCallback = Box<dyn FnOnce(SyncResult) + Send>;

/// Record of one synchronization round.
#[derive(Debug, Clone, PartialEq)]
pub struct SynchronizationRequest {
    /// Queue contents at the start of the round.
    pub snapshot: Vec<OutboundNotification>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Why one transport leg of a round ended without a response.
enum LegError {
    /// The round is over; no other transport is tried.
    Terminal(SyncError),
    /// This transport gave up; the round may continue on another one.
    Exhausted(SyncError),
}

enum Completion {
    /// Routed through the callback executor.
    Callback(SyncCallback),
    /// Resolved directly; the waiter may be blocking a host thread.
    Waiter(oneshot::Sender<SyncResult>),
}

#[derive(Default)]
struct Flight {
    in_flight: bool,
    rerun_requested: bool,
    current: Vec<Completion>,
    current_created_at: Option<DateTime<Utc>>,
    next: Vec<Completion>,
    next_created_at: Option<DateTime<Utc>>,
}

/// Collaborators of a [`SyncCoordinator`].
pub struct CoordinatorDeps {
    pub rest: Arc<dyn Transport>,
    pub persistent: Option<Arc<dyn Transport>>,
    pub store: Arc<dyn SyncStore>,
    pub registry: Arc<SubscriptionRegistry>,
    pub auth: Arc<dyn Authenticator>,
    pub executor: Arc<dyn CallbackExecutor>,
    pub clock: Arc<dyn ClockSource>,
    pub events: EventBus,
    pub retry: RetryPolicy,
    pub rest_only: bool,
}

struct Inner {
    deps: CoordinatorDeps,
    runtime: Handle,
    flight: Mutex<Flight>,
    queue: Mutex<VecDeque<OutboundNotification>>,
    suspended: AtomicBool,
    /// The store is behind the in-memory queue; cleared by the next full write.
    queue_dirty: AtomicBool,
    online: AtomicBool,
    background: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    last_round: Mutex<Option<SynchronizationRequest>>,
}

/// Single-flight synchronization engine. Cloning shares the coordinator.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Creates a coordinator, restoring the pending queue from the store.
    pub fn new(deps: CoordinatorDeps, runtime: Handle) -> Result<Self, StoreError> {
        let pending = deps.store.load_pending()?;
        let last_sync = deps.store.last_sync()?;
        if !pending.is_empty() {
            info!(count = pending.len(), "restored pending notifications");
        }
        let inner = Inner {
            deps,
            runtime,
            flight: Mutex::new(Flight::default()),
            queue: Mutex::new(pending.into()),
            suspended: AtomicBool::new(false),
            queue_dirty: AtomicBool::new(false),
            online: AtomicBool::new(true),
            background: AtomicBool::new(false),
            last_sync: Mutex::new(last_sync),
            last_round: Mutex::new(None),
        };
        Ok(SyncCoordinator {
            inner: Arc::new(inner),
        })
    }

    /// Queues a notification for the next round. Persisted before return.
    pub fn enqueue(&self, notification: OutboundNotification) -> Result<(), SyncError> {
        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        if self.inner.queue_dirty.load(Ordering::SeqCst) {
            queue.push_back(notification);
            if let Err(e) = self.persist_queue(&mut queue) {
                queue.pop_back();
                return Err(e.into());
            }
        } else {
            self.inner.deps.store.append_pending(&notification)?;
            queue.push_back(notification);
        }
        if let Some(queued) = queue.back() {
            debug!(id = %queued.id, kind = %queued.notification_type, "queued notification");
        }
        Ok(())
    }

    /// Requests a round; `callback` receives exactly one outcome.
    pub fn synchronize<F>(&self, callback: F)
    where
        F: FnOnce(SyncResult) + Send + 'static,
    {
        self.request(Some(Completion::Callback(Box::new(callback))));
    }

    /// Requests a round and waits for the round it joins to finish.
    pub async fn synchronize_now(&self) -> SyncResult {
        let (tx, rx) = oneshot::channel();
        self.request(Some(Completion::Waiter(tx)));
        rx.await.unwrap_or(Err(SyncError::Aborted))
    }

    /// Blocking form of [`synchronize_now`] for threads outside the runtime.
    ///
    /// Must not be called from within an async context.
    ///
    /// [`synchronize_now`]: SyncCoordinator::synchronize_now
    pub fn synchronize_blocking(&self) -> SyncResult {
        let (tx, rx) = oneshot::channel();
        self.request(Some(Completion::Waiter(tx)));
        rx.blocking_recv().unwrap_or(Err(SyncError::Aborted))
    }

    /// Requests a round without waiting for its outcome.
    pub fn trigger(&self) {
        self.request(None);
    }

    /// Handles an unsolicited delivery from the persistent channel.
    pub async fn handle_push(&self, payload: PushPayload) {
        match payload {
            PushPayload::Notifications(notifications) => {
                self.deliver_inbound(&notifications);
            }
            PushPayload::Pending { notification_id } => {
                match self.inner.deps.rest.fetch(&notification_id).await {
                    Ok(notification) => {
                        self.deliver_inbound(std::slice::from_ref(&notification));
                    }
                    Err(e) => {
                        debug!(notification_id = %notification_id, error = %e, "fetch failed, synchronizing instead");
                        self.trigger();
                    }
                }
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Copy of the pending queue, oldest first.
    pub fn pending(&self) -> Vec<OutboundNotification> {
        self.inner
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_sync.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The most recently finished round.
    pub fn last_round(&self) -> Option<SynchronizationRequest> {
        self.inner
            .last_round
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.flight.lock().unwrap_or_else(|e| e.into_inner()).in_flight
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    /// Lifts a suspension recorded after a 403.
    pub fn clear_suspension(&self) {
        if self.inner.suspended.swap(false, Ordering::SeqCst) {
            info!("suspension cleared");
        }
    }

    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }

    /// Marks subsequent rounds as running while the app is backgrounded.
    pub fn set_background(&self, background: bool) {
        self.inner.background.store(background, Ordering::SeqCst);
    }

    fn request(&self, completion: Option<Completion>) {
        let now = self.inner.deps.clock.now();
        {
            let mut flight = self.inner.flight.lock().unwrap_or_else(|e| e.into_inner());
            if flight.in_flight {
                flight.rerun_requested = true;
                flight.next_created_at.get_or_insert(now);
                flight.next.extend(completion);
                debug!("round in flight, coalescing request");
                return;
            }
            flight.in_flight = true;
            flight.current.extend(completion);
            flight.current_created_at = Some(now);
        }

        let coordinator = self.clone();
        self.inner.runtime.spawn(async move {
            coordinator.run_flight().await;
        });
    }

    async fn run_flight(&self) {
        let mut follow_ups = 0u32;
        loop {
            let created_at = {
                let mut flight = self.inner.flight.lock().unwrap_or_else(|e| e.into_inner());
                flight.current_created_at.take()
            }
            .unwrap_or_else(|| self.inner.deps.clock.now());

            let outcome = self.run_round(created_at).await;
            let more = matches!(&outcome, Ok(report) if report.more_available);
            if more {
                follow_ups += 1;
            }

            let (done, rerun) = {
                let mut flight = self.inner.flight.lock().unwrap_or_else(|e| e.into_inner());
                let done = std::mem::take(&mut flight.current);
                let rerun =
                    flight.rerun_requested || (more && follow_ups <= MAX_FOLLOW_UP_ROUNDS);
                if rerun {
                    flight.rerun_requested = false;
                    flight.current = std::mem::take(&mut flight.next);
                    flight.current_created_at = flight.next_created_at.take();
                } else {
                    flight.in_flight = false;
                }
                (done, rerun)
            };

            self.publish_outcome(&outcome);
            self.deliver(done, &outcome);

            if !rerun {
                break;
            }
        }
    }

    fn publish_outcome(&self, outcome: &SyncResult) {
        let event = match outcome {
            Ok(report) => LocalEvent::SyncCompleted {
                sent: report.sent,
                received: report.received,
            },
            Err(e) => LocalEvent::SyncFailed {
                error: e.to_string(),
            },
        };
        self.inner.deps.events.publish(event);
    }

    fn deliver(&self, completions: Vec<Completion>, outcome: &SyncResult) {
        for completion in completions {
            let outcome = outcome.clone();
            match completion {
                Completion::Callback(callback) => self
                    .inner
                    .deps
                    .executor
                    .execute(Box::new(move || callback(outcome))),
                Completion::Waiter(tx) => {
                    let _ = tx.send(outcome);
                }
            }
        }
    }

    async fn run_round(&self, created_at: DateTime<Utc>) -> SyncResult {
        if self.is_suspended() {
            return Err(SyncError::Suspended);
        }
        if !self.inner.online.load(Ordering::SeqCst) {
            return Err(SyncError::NetworkUnavailable);
        }

        self.flush_dirty_queue();
        let started_at = self.inner.deps.clock.now();
        let snapshot = self.pending();
        let request = SyncRequest {
            client_notifications: snapshot.clone(),
            is_background: self.inner.background.load(Ordering::SeqCst),
        };
        debug!(outbound = snapshot.len(), "starting synchronization round");

        let result = self.exchange(&request).await;
        let finished_at = self.inner.deps.clock.now();
        *self.inner.last_round.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(SynchronizationRequest {
                snapshot: snapshot.clone(),
                created_at,
                started_at: Some(started_at),
                finished_at: Some(finished_at),
            });

        let (response, transport) = match result {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, pending = snapshot.len(), "synchronization failed");
                return Err(e);
            }
        };

        self.remove_sent(&snapshot);
        let received = self.deliver_inbound(&response.server_notifications);

        if let Err(e) = self.inner.deps.store.set_last_sync(finished_at) {
            warn!(error = %e, "failed to persist last sync time");
        }
        *self.inner.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(finished_at);

        info!(
            sent = snapshot.len(),
            received,
            %transport,
            more = response.more_notifications_available,
            "synchronization complete"
        );
        Ok(SyncReport {
            sent: snapshot.len(),
            received,
            transport,
            completed_at: finished_at,
            more_available: response.more_notifications_available,
        })
    }

    async fn exchange(
        &self,
        request: &SyncRequest,
    ) -> Result<(SyncResponse, TransportKind), SyncError> {
        let deps = &self.inner.deps;
        if let Some(persistent) = deps.persistent.as_ref().filter(|_| !deps.rest_only) {
            if persistent.is_available() {
                match self.send_with_retry(persistent.as_ref(), request).await {
                    Ok(response) => return Ok((response, TransportKind::Persistent)),
                    Err(LegError::Terminal(e)) => return Err(e),
                    Err(LegError::Exhausted(e)) => {
                        info!(error = %e, "persistent channel gave up, falling back to REST");
                    }
                }
            }
        }

        match self.send_with_retry(deps.rest.as_ref(), request).await {
            Ok(response) => Ok((response, deps.rest.kind())),
            Err(LegError::Terminal(e) | LegError::Exhausted(e)) => Err(e),
        }
    }

    /// Sends on one transport, retrying transient failures per the policy.
    async fn send_with_retry(
        &self,
        transport: &dyn Transport,
        request: &SyncRequest,
    ) -> Result<SyncResponse, LegError> {
        let mut state = self.inner.deps.retry.start();
        let mut reauthenticated = false;

        loop {
            let err = match transport.send(request).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };
            state.record_failure(&err);

            match classify(&err) {
                Disposition::Retry => {
                    if transport.kind() == TransportKind::Persistent
                        && matches!(err, TransportError::ConnectionClosed)
                    {
                        return Err(LegError::Exhausted(SyncError::TransportUnavailable));
                    }
                    let delay = state.delay_before_next_retry();
                    if !state.retry() {
                        warn!(
                            attempts = state.attempt_count,
                            transport = %transport.kind(),
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(LegError::Exhausted(state.exhausted()));
                    }
                    debug!(
                        attempt = state.attempt_count,
                        delay_ms = delay.as_millis() as u64,
                        transport = %transport.kind(),
                        error = %err,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Disposition::Reauthenticate => {
                    if reauthenticated {
                        return Err(LegError::Terminal(SyncError::Unauthorized));
                    }
                    reauthenticated = true;
                    info!("token rejected, re-authenticating");
                    if let Err(e) = self.inner.deps.auth.reauthenticate().await {
                        warn!(error = %e, "re-authentication failed");
                        return Err(LegError::Terminal(SyncError::Unauthorized));
                    }
                }
                Disposition::Validation(fields) => {
                    return Err(LegError::Terminal(SyncError::ValidationFailure(fields)));
                }
                Disposition::Suspended => {
                    self.suspend();
                    return Err(LegError::Terminal(SyncError::Suspended));
                }
                Disposition::Fail(e) => return Err(LegError::Exhausted(e)),
            }
        }
    }

    fn suspend(&self) {
        if !self.inner.suspended.swap(true, Ordering::SeqCst) {
            warn!("backend reported account suspended, halting synchronization");
        }
    }

    /// Drops exactly the notifications that were part of a successful round.
    fn remove_sent(&self, snapshot: &[OutboundNotification]) {
        if snapshot.is_empty() {
            return;
        }
        let sent: HashSet<&str> = snapshot.iter().map(|n| n.id.as_str()).collect();
        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.retain(|n| !sent.contains(n.id.as_str()));
        self.inner.queue_dirty.store(true, Ordering::SeqCst);
        if let Err(e) = self.persist_queue(&mut queue) {
            warn!(error = %e, pending = queue.len(), "failed to persist queue after synchronization");
            self.inner.deps.events.publish(LocalEvent::QueuePersistFailed {
                error: e.to_string(),
            });
        }
    }

    /// Rewrites the whole queue when the store is behind it.
    ///
    /// Called with the queue lock held.
    fn persist_queue(&self, queue: &mut VecDeque<OutboundNotification>) -> Result<(), StoreError> {
        if !self.inner.queue_dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.deps.store.save_pending(queue.make_contiguous())?;
        self.inner.queue_dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Retries a queue write that failed after an earlier round.
    fn flush_dirty_queue(&self) {
        let mut queue = self.inner.queue.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = self.persist_queue(&mut queue) {
            warn!(error = %e, "queue still not persisted");
        }
    }

    /// Dispatches inbound notifications and queues their acknowledgements.
    fn deliver_inbound(&self, notifications: &[ServerNotification]) -> usize {
        if notifications.is_empty() {
            return 0;
        }
        let acks = self
            .inner
            .deps
            .registry
            .dispatch(notifications, self.inner.deps.clock.now());
        for ack in acks {
            if let Err(e) = self.enqueue(ack) {
                warn!(error = %e, "failed to queue acknowledgement");
            }
        }
        notifications.len()
    }
}

impl SyncTrigger for SyncCoordinator {
    fn request_sync(&self) {
        self.trigger();
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
