// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent channel connection management.
//!
//! The monitor runs connection attempts in background tasks so callers stay
//! responsive while the channel connects. State is kept in atomics so
//! `is_connected()` never blocks.
//!
//! ```text
//! Disconnected ──start()──► Connecting ──link open──► Connected
//!      ▲                        │                         │
//!      └──── stop() / retries ──┘◄──── drop (reconnect) ──┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use donky_core::{ClientFrame, ServerFrame, ServerNotification, SyncRequest, SyncResponse};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ChannelConnector, ChannelLink};
use crate::auth::Authenticator;
use crate::events::{EventBus, LocalEvent};
use crate::transport::{TransportError, TransportResult};

/// Connection state values for atomic state field.
pub const STATE_DISCONNECTED: u8 = 0;
pub const STATE_CONNECTING: u8 = 1;
pub const STATE_CONNECTED: u8 = 2;

/// Observable state of the persistent channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state shared between background tasks and callers.
///
/// Uses atomic fields for lock-free reads.
pub struct SharedConnectionState {
    /// Current state (atomic for lock-free reads).
    state: AtomicU8,
    /// Connection attempt count (for status reporting).
    attempt: AtomicU32,
}

impl SharedConnectionState {
    /// Create a new shared state initialized to disconnected.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_DISCONNECTED),
            attempt: AtomicU32::new(0),
        }
    }

    /// Get the current state.
    pub fn get(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Set the state.
    pub fn set(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    /// Moves Disconnected → Connecting. Returns false if a connect is
    /// already running or the channel is up.
    pub fn try_begin_connect(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_DISCONNECTED,
                STATE_CONNECTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Get the current attempt count.
    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::Acquire)
    }

    /// Set the attempt count.
    pub fn set_attempt(&self, attempt: u32) {
        self.attempt.store(attempt, Ordering::Release);
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.get() == STATE_CONNECTED
    }

    /// Check if currently connecting.
    pub fn is_connecting(&self) -> bool {
        self.get() == STATE_CONNECTING
    }

    pub fn state(&self) -> ConnectionState {
        match self.get() {
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Get a human-readable status string.
    pub fn status_string(&self) -> String {
        match self.get() {
            STATE_DISCONNECTED => "disconnected".to_string(),
            STATE_CONNECTING => {
                let attempt = self.attempt();
                if attempt > 0 {
                    format!("connecting (attempt {})", attempt)
                } else {
                    "connecting".to_string()
                }
            }
            STATE_CONNECTED => "connected".to_string(),
            _ => "unknown".to_string(),
        }
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the connection monitor.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// URL to connect to.
    pub url: String,
    /// Maximum connection attempts per connect cycle (0 = unlimited).
    pub max_retries: u32,
    /// Maximum delay between connection attempts (seconds).
    pub max_delay_secs: u64,
    /// Initial delay for exponential backoff (milliseconds).
    pub initial_delay_ms: u64,
    /// How long a request waits for its correlated response.
    pub request_timeout: Duration,
    /// Keepalive ping interval (zero disables pings).
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7890".to_string(),
            max_retries: 10,
            max_delay_secs: 30,
            initial_delay_ms: 100,
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Unsolicited delivery received over the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPayload {
    /// Notifications delivered inline.
    Notifications(Vec<ServerNotification>),
    /// A notification is waiting on the backend and must be fetched.
    Pending { notification_id: String },
}

struct ActiveLink {
    outgoing: mpsc::Sender<ClientFrame>,
    /// Token the link was opened with.
    token: Option<String>,
    generation: u64,
    /// Stops this link's reader task.
    cancel: CancellationToken,
}

type PendingMap = HashMap<u64, oneshot::Sender<TransportResult<SyncResponse>>>;

struct Inner {
    config: ConnectionConfig,
    connector: Arc<dyn ChannelConnector>,
    auth: Arc<dyn Authenticator>,
    runtime: Handle,
    state: SharedConnectionState,
    link: Mutex<Option<ActiveLink>>,
    pending: Mutex<PendingMap>,
    next_request_id: AtomicU64,
    next_generation: AtomicU64,
    cancel: Mutex<CancellationToken>,
    /// The host wants the channel up.
    running: AtomicBool,
    online: AtomicBool,
    push_tx: mpsc::UnboundedSender<PushPayload>,
    events: EventBus,
}

/// Owns the persistent channel: connects, correlates requests, forwards
/// pushes, reconnects after drops. Cloning shares the monitor.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<Inner>,
}

impl ConnectionMonitor {
    /// Create a new monitor.
    ///
    /// Returns the monitor and a receiver for pushed notifications.
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn ChannelConnector>,
        auth: Arc<dyn Authenticator>,
        events: EventBus,
        runtime: Handle,
    ) -> (Self, mpsc::UnboundedReceiver<PushPayload>) {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            config,
            connector,
            auth,
            runtime,
            state: SharedConnectionState::new(),
            link: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
            cancel: Mutex::new(CancellationToken::new()),
            running: AtomicBool::new(false),
            online: AtomicBool::new(true),
            push_tx,
            events,
        };
        (
            ConnectionMonitor {
                inner: Arc::new(inner),
            },
            push_rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    pub fn status_string(&self) -> String {
        self.inner.state.status_string()
    }

    /// Start connecting. A no-op while connecting or connected.
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
        if !self.inner.online.load(Ordering::SeqCst) {
            debug!("network offline, deferring channel connect");
            return;
        }
        self.spawn_connect(None);
    }

    /// Stop the channel: cancel any connect in progress, close the link and
    /// fail outstanding requests.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.teardown("stopped");
    }

    /// React to OS connectivity changes.
    pub fn on_connectivity_changed(&self, online: bool) {
        let was_online = self.inner.online.swap(online, Ordering::SeqCst);
        if online == was_online {
            return;
        }
        info!(online, "connectivity changed");
        if !online {
            self.teardown("network lost");
        } else if self.inner.running.load(Ordering::SeqCst) {
            self.spawn_connect(None);
        }
    }

    /// Send one synchronization request over the link and wait for its
    /// correlated response.
    pub async fn request(&self, request: &SyncRequest) -> TransportResult<SyncResponse> {
        if !self.is_connected() {
            return Err(TransportError::Unavailable("channel not connected".into()));
        }

        let generation = {
            let guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                None => {
                    return Err(TransportError::Unavailable("channel not connected".into()));
                }
                Some(link) => link.generation,
            }
        };

        if self.link_is_stale(generation) {
            info!("auth token changed, reopening channel");
            self.link_lost(generation, Some(Duration::ZERO));
            return Err(TransportError::Unavailable("channel link is stale".into()));
        }

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        // Registered under the link lock: a link dropped after this point
        // drains the entry, one dropped before it is seen here.
        let outgoing = {
            let guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(link) if link.generation == generation => {
                    self.pending().insert(request_id, tx);
                    link.outgoing.clone()
                }
                _ => return Err(TransportError::Unavailable("channel link lost".into())),
            }
        };

        let frame = ClientFrame::synchronise(request_id, request.clone());
        if outgoing.send(frame).await.is_err() {
            self.pending().remove(&request_id);
            return Err(TransportError::ConnectionClosed);
        }
        debug!(request_id, "synchronise frame sent");

        match tokio::time::timeout(self.inner.config.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.pending().remove(&request_id);
                warn!(request_id, "channel request timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.inner.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_cancel_token(&self) -> CancellationToken {
        self.inner
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn link_is_stale(&self, generation: u64) -> bool {
        let current = self.inner.auth.token();
        let guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .is_some_and(|link| link.generation == generation && link.token != current)
    }

    fn spawn_connect(&self, delay: Option<Duration>) {
        if !self.inner.state.try_begin_connect() {
            debug!(status = %self.status_string(), "connect already in progress");
            return;
        }
        let monitor = self.clone();
        let cancel_token = self.current_cancel_token();
        self.inner.runtime.spawn(async move {
            monitor.connect_with_retry(cancel_token, delay).await;
        });
    }

    /// Background connection task with exponential backoff.
    async fn connect_with_retry(&self, cancel_token: CancellationToken, delay: Option<Duration>) {
        let config = &self.inner.config;

        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let mut attempt = 0u32;
        let mut delay_ms = config.initial_delay_ms;

        loop {
            if cancel_token.is_cancelled() {
                return;
            }

            attempt = attempt.saturating_add(1);
            if !self.set_state_unless_cancelled(&cancel_token, STATE_CONNECTING, attempt) {
                return;
            }

            let token = self.inner.auth.token();
            let connect_result = tokio::select! {
                _ = cancel_token.cancelled() => return,
                result = self.inner.connector.connect(&config.url, token.as_deref()) => result,
            };

            match connect_result {
                Ok(link) => {
                    self.install(link, token, cancel_token);
                    return;
                }
                Err(e) => {
                    if config.max_retries > 0 && attempt >= config.max_retries {
                        warn!(attempts = attempt, error = %e, "giving up on channel connect");
                        self.set_state_unless_cancelled(&cancel_token, STATE_DISCONNECTED, 0);
                        return;
                    }
                    debug!(attempt, error = %e, delay_ms, "channel connect failed, backing off");

                    tokio::select! {
                        _ = cancel_token.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    }

                    delay_ms = std::cmp::min(
                        delay_ms.saturating_mul(2),
                        config.max_delay_secs.saturating_mul(1000),
                    );
                }
            }
        }
    }

    /// State writes from connect tasks go through the link lock so a
    /// cancelled task cannot overwrite the state set by `teardown`.
    fn set_state_unless_cancelled(
        &self,
        cancel_token: &CancellationToken,
        state: u8,
        attempt: u32,
    ) -> bool {
        let _guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
        if cancel_token.is_cancelled() {
            return false;
        }
        self.inner.state.set(state);
        self.inner.state.set_attempt(attempt);
        true
    }

    fn install(&self, link: ChannelLink, token: Option<String>, cancel_token: CancellationToken) {
        let ChannelLink { outgoing, incoming } = link;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let link_cancel = cancel_token.child_token();
        {
            let mut guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
            if cancel_token.is_cancelled() {
                return;
            }
            *guard = Some(ActiveLink {
                outgoing: outgoing.clone(),
                token,
                generation,
                cancel: link_cancel.clone(),
            });
            self.inner.state.set(STATE_CONNECTED);
            self.inner.state.set_attempt(0);
        }
        info!(url = %self.inner.config.url, generation, "channel connected");
        self.inner.events.publish(LocalEvent::ChannelConnected);

        let monitor = self.clone();
        self.inner.runtime.spawn(async move {
            monitor
                .read_loop(incoming, outgoing, generation, link_cancel)
                .await;
        });
    }

    async fn read_loop(
        &self,
        mut incoming: mpsc::Receiver<ServerFrame>,
        outgoing: mpsc::Sender<ClientFrame>,
        generation: u64,
        cancel_token: CancellationToken,
    ) {
        let heartbeat = self.inner.config.heartbeat_interval;
        let mut ticker = tokio::time::interval(if heartbeat.is_zero() {
            Duration::from_secs(3600)
        } else {
            heartbeat
        });
        ticker.tick().await;
        let mut ping_id = 0u64;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                _ = ticker.tick(), if !heartbeat.is_zero() => {
                    ping_id = ping_id.wrapping_add(1);
                    if outgoing.send(ClientFrame::ping(ping_id)).await.is_err() {
                        break;
                    }
                }
                frame = incoming.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => break,
                },
            }
        }

        let backoff = Duration::from_millis(self.inner.config.initial_delay_ms);
        self.link_lost(generation, Some(backoff));
    }

    fn handle_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::SynchroniseResult {
                request_id,
                response,
            } => self.complete(request_id, Ok(response)),
            ServerFrame::Failure {
                request_id,
                status,
                message,
                field_errors,
            } => {
                debug!(request_id, status, message = %message, "synchronise failed on channel");
                let err = if status == 400 {
                    TransportError::Validation(field_errors)
                } else {
                    TransportError::Status {
                        code: status,
                        retry_after: None,
                    }
                };
                self.complete(request_id, Err(err));
            }
            ServerFrame::Push { notifications } => {
                debug!(count = notifications.len(), "push received");
                let _ = self
                    .inner
                    .push_tx
                    .send(PushPayload::Notifications(notifications));
            }
            ServerFrame::Pending { notification_id } => {
                debug!(notification_id = %notification_id, "pending notification announced");
                let _ = self
                    .inner
                    .push_tx
                    .send(PushPayload::Pending { notification_id });
            }
            ServerFrame::Pong { id } => tracing::trace!(id, "pong"),
        }
    }

    fn complete(&self, request_id: u64, result: TransportResult<SyncResponse>) {
        match self.pending().remove(&request_id) {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(request_id, "response for unknown request"),
        }
    }

    fn fail_pending(&self) {
        let drained: Vec<_> = self.pending().drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(Err(TransportError::ConnectionClosed));
        }
    }

    /// Handles an unexpected drop of link `generation`. Stale notices from
    /// already-replaced links are ignored.
    fn link_lost(&self, generation: u64, reconnect_after: Option<Duration>) {
        {
            let mut guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                Some(link) if link.generation == generation => {
                    link.cancel.cancel();
                    guard.take();
                }
                _ => return,
            }
            self.inner.state.set(STATE_DISCONNECTED);
            self.inner.state.set_attempt(0);
        }
        warn!(generation, "channel link lost");
        self.fail_pending();
        self.inner.events.publish(LocalEvent::ChannelDisconnected);

        if self.inner.running.load(Ordering::SeqCst) && self.inner.online.load(Ordering::SeqCst) {
            self.spawn_connect(reconnect_after);
        }
    }

    fn teardown(&self, reason: &str) {
        let old = {
            let mut cancel = self.inner.cancel.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *cancel, CancellationToken::new())
        };
        old.cancel();

        let had_link = {
            let mut guard = self.inner.link.lock().unwrap_or_else(|e| e.into_inner());
            let had_link = guard.take().is_some();
            self.inner.state.set(STATE_DISCONNECTED);
            self.inner.state.set_attempt(0);
            had_link
        };
        self.fail_pending();

        if had_link {
            info!(reason, "channel closed");
            self.inner.events.publish(LocalEvent::ChannelDisconnected);
        }
    }
}
