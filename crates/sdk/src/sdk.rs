// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root.
//!
//! [`SdkBuilder`] wires the engine together from an [`SdkConfig`] plus any
//! collaborators the host wants to supply (store, authenticator, connector,
//! scheduler, callback executor). Anything not supplied gets the production
//! default. The resulting [`Sdk`] is the host-facing surface.
//!
//! Two background tasks run per SDK:
//! - the push pump, forwarding channel pushes to the coordinator
//! - the event pump, reacting to lifecycle and channel events

use std::sync::Arc;

use chrono::{DateTime, Utc};
use donky_core::{
    ClockSource, NotificationCategory, OutboundNotification, ServerNotification, SystemClock,
};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{Authenticator, RestAuthenticator, StaticAuthenticator};
use crate::channel::{ChannelConnector, ConnectionMonitor, PushPayload, WebSocketConnector};
use crate::config::SdkConfig;
use crate::coordinator::{CoordinatorDeps, SyncCoordinator, SyncResult};
use crate::error::{Error, Result, SyncError};
use crate::events::{EventBus, EventStream, LocalEvent};
use crate::executor::{CallbackExecutor, InlineExecutor};
use crate::lifecycle::{AppLifecycle, LaunchContext, Phase};
use crate::registry::{ModuleDefinition, SubscriptionId, SubscriptionRegistry};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::{FileStore, SyncStore};
use crate::transport::{PersistentTransport, RestTransport, Transport};

/// Server notification telling this device a message was read elsewhere.
pub const SYNC_MESSAGE_READ_TYPE: &str = "SyncMessageRead";
/// Server notification telling this device a message was deleted elsewhere.
pub const SYNC_MESSAGE_DELETED_TYPE: &str = "SyncMessageDeleted";

const CORE_MODULE_NAME: &str = "DonkyCore";

/// Snapshot of SDK state for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkStatus {
    pub pending: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub channel: String,
    pub suspended: bool,
    pub foreground: bool,
}

/// Builds an [`Sdk`].
pub struct SdkBuilder {
    config: SdkConfig,
    store: Option<Arc<dyn SyncStore>>,
    auth: Option<Arc<dyn Authenticator>>,
    connector: Option<Arc<dyn ChannelConnector>>,
    rest: Option<Arc<dyn Transport>>,
    executor: Option<Arc<dyn CallbackExecutor>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<Arc<dyn ClockSource>>,
    runtime: Option<Handle>,
}

impl SdkBuilder {
    pub fn new(config: SdkConfig) -> Self {
        SdkBuilder {
            config,
            store: None,
            auth: None,
            connector: None,
            rest: None,
            executor: None,
            scheduler: None,
            clock: None,
            runtime: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn SyncStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn authenticator(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn ChannelConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replaces the REST transport (used by tests and embedded backends).
    pub fn rest_transport(mut self, rest: Arc<dyn Transport>) -> Self {
        self.rest = Some(rest);
        self
    }

    pub fn executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Wires everything together and starts the background pumps.
    pub fn build(self) -> Result<Sdk> {
        let config = self.config;
        config.validate()?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = EventBus::new();

        let auth: Arc<dyn Authenticator> = match self.auth {
            Some(auth) => auth,
            None if config.api_key.is_empty() => Arc::new(StaticAuthenticator::new(None)),
            None => Arc::new(RestAuthenticator::new(
                &config.rest_base_url,
                &config.api_key,
                config.request_timeout(),
            )?),
        };
        let store: Arc<dyn SyncStore> = match self.store {
            Some(store) => store,
            None => Arc::new(FileStore::open(&config.resolve_state_dir()?)?),
        };
        let rest: Arc<dyn Transport> = match self.rest {
            Some(rest) => rest,
            None => Arc::new(RestTransport::new(
                &config.rest_base_url,
                &config.api_key,
                Arc::clone(&auth),
                config.request_timeout(),
            )?),
        };
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector));

        let (monitor, pushes) = ConnectionMonitor::new(
            config.connection_config(),
            connector,
            Arc::clone(&auth),
            events.clone(),
            runtime.clone(),
        );
        let persistent: Arc<dyn Transport> = Arc::new(PersistentTransport::new(monitor.clone()));

        let registry = Arc::new(SubscriptionRegistry::new());
        register_core_handlers(&registry, &events);

        let coordinator = SyncCoordinator::new(
            CoordinatorDeps {
                rest,
                persistent: Some(persistent),
                store,
                registry: Arc::clone(&registry),
                auth,
                executor: self.executor.unwrap_or_else(|| Arc::new(InlineExecutor)),
                clock: Arc::clone(&clock),
                events: events.clone(),
                retry: config.retry_policy(),
                rest_only: config.rest_only,
            },
            runtime.clone(),
        )?;

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::new(runtime.clone(), Arc::clone(&clock))));
        let lifecycle = AppLifecycle::new(
            config.lifecycle_config(),
            scheduler,
            Arc::new(coordinator.clone()),
            events.clone(),
        );

        let shutdown = CancellationToken::new();
        runtime.spawn(push_pump(coordinator.clone(), pushes, shutdown.clone()));
        runtime.spawn(event_pump(
            coordinator.clone(),
            monitor.clone(),
            events.subscribe(),
            shutdown.clone(),
        ));

        info!(
            rest = %config.rest_base_url,
            channel = %config.channel_url,
            rest_only = config.rest_only,
            pending = coordinator.pending_count(),
            "sdk initialized"
        );
        Ok(Sdk {
            coordinator,
            monitor,
            lifecycle,
            registry,
            events,
            clock,
            shutdown,
        })
    }
}

/// Host-facing SDK handle.
pub struct Sdk {
    coordinator: SyncCoordinator,
    monitor: ConnectionMonitor,
    lifecycle: AppLifecycle,
    registry: Arc<SubscriptionRegistry>,
    events: EventBus,
    clock: Arc<dyn ClockSource>,
    shutdown: CancellationToken,
}

impl Sdk {
    pub fn builder(config: SdkConfig) -> SdkBuilder {
        SdkBuilder::new(config)
    }

    /// The app came to the foreground.
    pub fn on_resumed(&self, launch: LaunchContext) {
        self.coordinator.set_background(false);
        self.lifecycle.on_resumed(launch);
    }

    /// The app went to the background.
    pub fn on_paused(&self) {
        self.coordinator.set_background(true);
        self.lifecycle.on_paused();
    }

    /// OS connectivity changed.
    pub fn on_connectivity_changed(&self, online: bool) {
        self.coordinator.set_online(online);
        self.monitor.on_connectivity_changed(online);
        if online && self.lifecycle.phase() != Phase::Closed {
            self.coordinator.trigger();
        }
    }

    /// Connects the persistent channel regardless of app lifecycle.
    pub fn start_channel(&self) {
        self.monitor.start();
    }

    pub fn enqueue(&self, notification: OutboundNotification) -> std::result::Result<(), SyncError> {
        self.coordinator.enqueue(notification)
    }

    /// Queues a "message read" report.
    pub fn mark_message_read(&self, message_id: &str) -> std::result::Result<(), SyncError> {
        self.enqueue(OutboundNotification::message_read(message_id, self.clock.now()))
    }

    /// Queues a "message deleted" report.
    pub fn mark_message_deleted(&self, message_id: &str) -> std::result::Result<(), SyncError> {
        self.enqueue(OutboundNotification::message_deleted(message_id, self.clock.now()))
    }

    /// Queues an application-defined notification.
    pub fn send_custom(&self, custom_type: &str, data: Value) -> std::result::Result<(), SyncError> {
        self.enqueue(OutboundNotification::custom(custom_type, data, self.clock.now()))
    }

    pub fn synchronize<F>(&self, callback: F)
    where
        F: FnOnce(SyncResult) + Send + 'static,
    {
        self.coordinator.synchronize(callback);
    }

    pub async fn synchronize_now(&self) -> SyncResult {
        self.coordinator.synchronize_now().await
    }

    pub fn synchronize_blocking(&self) -> SyncResult {
        self.coordinator.synchronize_blocking()
    }

    pub fn subscribe<F>(
        &self,
        module: ModuleDefinition,
        category: NotificationCategory,
        notification_type: &str,
        auto_acknowledge: bool,
        listener: F,
    ) -> SubscriptionId
    where
        F: Fn(&ServerNotification) + Send + Sync + 'static,
    {
        self.registry
            .subscribe(module, category, notification_type, auto_acknowledge, listener)
    }

    pub fn subscribe_batch<F>(
        &self,
        module: ModuleDefinition,
        category: NotificationCategory,
        notification_type: &str,
        auto_acknowledge: bool,
        listener: F,
    ) -> SubscriptionId
    where
        F: Fn(&[ServerNotification]) + Send + Sync + 'static,
    {
        self.registry
            .subscribe_batch(module, category, notification_type, auto_acknowledge, listener)
    }

    pub fn unsubscribe(
        &self,
        module_name: &str,
        category: NotificationCategory,
        notification_type: &str,
    ) -> usize {
        self.registry
            .unsubscribe(module_name, category, notification_type)
    }

    /// Subscribes to local events.
    pub fn events(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn lifecycle(&self) -> &AppLifecycle {
        &self.lifecycle
    }

    pub fn status(&self) -> SdkStatus {
        SdkStatus {
            pending: self.coordinator.pending_count(),
            last_sync: self.coordinator.last_sync(),
            channel: self.monitor.status_string(),
            suspended: self.coordinator.is_suspended(),
            foreground: self.lifecycle.phase() != Phase::Closed,
        }
    }

    /// Stops timers, the channel and the background pumps.
    pub fn shutdown(&self) {
        info!("sdk shutting down");
        self.lifecycle.shutdown();
        self.monitor.stop();
        self.shutdown.cancel();
    }
}

/// Built-in Donky handlers that surface message state changes as local events.
fn register_core_handlers(registry: &SubscriptionRegistry, events: &EventBus) {
    let module = ModuleDefinition::new(CORE_MODULE_NAME, env!("CARGO_PKG_VERSION"));

    let read_events = events.clone();
    registry.subscribe(
        module.clone(),
        NotificationCategory::Donky,
        SYNC_MESSAGE_READ_TYPE,
        true,
        move |notification| {
            if let Some(message_id) = message_id(notification) {
                read_events.publish(LocalEvent::MessageRead { message_id });
            }
        },
    );

    let deleted_events = events.clone();
    registry.subscribe(
        module,
        NotificationCategory::Donky,
        SYNC_MESSAGE_DELETED_TYPE,
        true,
        move |notification| {
            if let Some(message_id) = message_id(notification) {
                deleted_events.publish(LocalEvent::MessageDeleted { message_id });
            }
        },
    );
}

fn message_id(notification: &ServerNotification) -> Option<String> {
    let id = notification
        .data
        .get("messageId")
        .and_then(Value::as_str)
        .map(str::to_string);
    if id.is_none() {
        warn!(id = %notification.id, kind = %notification.notification_type, "notification without messageId");
    }
    id
}

async fn push_pump(
    coordinator: SyncCoordinator,
    mut pushes: mpsc::UnboundedReceiver<PushPayload>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            payload = pushes.recv() => match payload {
                Some(payload) => coordinator.handle_push(payload).await,
                None => break,
            },
        }
    }
    debug!("push pump stopped");
}

async fn event_pump(
    coordinator: SyncCoordinator,
    monitor: ConnectionMonitor,
    mut events: EventStream,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(LocalEvent::ApplicationStarted(_)) => monitor.start(),
            Ok(LocalEvent::ApplicationStopped(_)) => monitor.stop(),
            Ok(LocalEvent::ChannelConnected) => coordinator.trigger(),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event pump lagged"),
            Err(RecvError::Closed) => break,
        }
    }
    debug!("event pump stopped");
}

#[cfg(test)]
#[path = "sdk_tests.rs"]
mod tests;
