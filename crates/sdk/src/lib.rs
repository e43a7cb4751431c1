// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! donky - Client-side notification synchronization for the Donky network.
//!
//! This crate keeps a device's queue of client notifications in step with
//! the backend and dispatches server notifications to subscribers.
//!
//! # Main Components
//!
//! - [`Sdk`] - Top-level handle wiring every component together
//! - [`SyncCoordinator`] - Single-flight, coalescing synchronization rounds
//! - [`ConnectionMonitor`] - Persistent channel lifecycle and reconnects
//! - [`SubscriptionRegistry`] - Routing of server notifications to handlers
//! - [`AppLifecycle`] - Foreground/background tracking and periodic resync
//! - [`Error`] - Error types for all operations
//!
//! # Usage
//!
//! ```rust,ignore
//! use donky::{Sdk, SdkConfig, LaunchContext};
//!
//! let sdk = Sdk::builder(SdkConfig::load_or_default(None)?).build()?;
//! sdk.on_resumed(LaunchContext::default());
//! let report = sdk.synchronize_now().await?;
//! ```

mod cli;
pub mod commands;
mod logging;

pub mod auth;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod env;
pub mod error;
pub mod events;
pub mod executor;
pub mod lifecycle;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod sdk;
pub mod store;
pub mod transport;

pub use auth::{AuthError, Authenticator, RestAuthenticator, StaticAuthenticator};
pub use channel::{
    ChannelConnector, ChannelLink, ConnectionConfig, ConnectionMonitor, ConnectionState,
    PushPayload, WebSocketConnector,
};
pub use cli::{Cli, Command, OutputFormat};
pub use config::{ConfigError, SdkConfig};
pub use coordinator::{SyncCallback, SyncCoordinator, SyncReport, SyncResult};
pub use error::{Error, Result, SharedStoreError, SyncError};
pub use events::{EventBus, EventStream, LocalEvent};
pub use executor::{CallbackExecutor, InlineExecutor, MainThreadQueue, QueuedExecutor};
pub use lifecycle::{AppLifecycle, LaunchContext, LifecycleConfig, Phase, SyncTrigger};
pub use registry::{ModuleDefinition, SubscriptionId, SubscriptionRegistry};
pub use retry::RetryPolicy;
pub use scheduler::{ManualScheduler, Scheduler, TokioScheduler};
pub use sdk::{Sdk, SdkBuilder, SdkStatus};
pub use store::{FileStore, MemoryStore, StoreError, SyncStore};
pub use transport::{
    PersistentTransport, RestTransport, Transport, TransportError, TransportKind,
};

pub use donky_core::{
    NotificationCategory, OutboundNotification, ServerNotification, SyncRequest, SyncResponse,
};
