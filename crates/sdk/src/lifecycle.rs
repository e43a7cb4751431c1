// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Foreground/background tracking and periodic re-synchronization.
//!
//! The host reports raw pause/resume signals. A pause only counts as the
//! app closing once the grace window passes without a resume; a resume
//! inside the window is treated as if the pause never happened.
//!
//! ```text
//!          resumed                    paused
//! Closed ──────────► Foreground ─────────────► Pausing
//!   ▲                    ▲                        │
//!   │                    └──── resumed ───────────┤
//!   └───────────── grace window expires ──────────┘
//! ```

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::events::{ApplicationStartEvent, ApplicationStopEvent, EventBus, LocalEvent};
use crate::scheduler::{Scheduler, TaskId};

pub const DEFAULT_GRACE: Duration = Duration::from_millis(5_000);
pub const DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE: u64 = 5;

/// Something that can be asked to run a synchronization round.
pub trait SyncTrigger: Send + Sync {
    fn request_sync(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// How long a pause may last before the app counts as closed.
    pub grace: Duration,
    /// Periodic re-sync interval while foregrounded, in minutes.
    pub max_minutes_without_exchange: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            grace: DEFAULT_GRACE,
            max_minutes_without_exchange: DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE,
        }
    }
}

/// What the host knows about how the app was brought to the foreground.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchContext {
    pub opened_from_notification: bool,
    pub launch_data: Option<Value>,
}

impl LaunchContext {
    /// The app was opened by tapping a notification.
    pub fn from_notification(launch_data: Option<Value>) -> Self {
        LaunchContext {
            opened_from_notification: true,
            launch_data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Foreground,
    /// Paused, grace window running.
    Pausing,
}

struct State {
    phase: Phase,
    session_start: Option<DateTime<Utc>>,
    opened_from_notification: bool,
    max_minutes: u64,
    periodic: Option<TaskId>,
    stop_task: Option<TaskId>,
    /// Bumped on every pause so a stop task from an earlier pause is inert.
    pause_generation: u64,
}

struct Inner {
    scheduler: Arc<dyn Scheduler>,
    trigger: Arc<dyn SyncTrigger>,
    events: EventBus,
    grace: Duration,
    state: Mutex<State>,
}

/// Tracks the app session and drives periodic synchronization.
#[derive(Clone)]
pub struct AppLifecycle {
    inner: Arc<Inner>,
}

impl AppLifecycle {
    pub fn new(
        config: LifecycleConfig,
        scheduler: Arc<dyn Scheduler>,
        trigger: Arc<dyn SyncTrigger>,
        events: EventBus,
    ) -> Self {
        let state = State {
            phase: Phase::Closed,
            session_start: None,
            opened_from_notification: false,
            max_minutes: effective_minutes(config.max_minutes_without_exchange),
            periodic: None,
            stop_task: None,
            pause_generation: 0,
        };
        AppLifecycle {
            inner: Arc::new(Inner {
                scheduler,
                trigger,
                events,
                grace: config.grace,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Start of the current session, if the app is open.
    pub fn session_start(&self) -> Option<DateTime<Utc>> {
        self.lock().session_start
    }

    pub fn sync_interval(&self) -> Duration {
        minutes(self.lock().max_minutes)
    }

    /// The host brought the app to the foreground.
    pub fn on_resumed(&self, launch: LaunchContext) {
        let started = {
            let mut state = self.lock();
            match state.phase {
                Phase::Foreground => return,
                Phase::Pausing => {
                    if let Some(id) = state.stop_task.take() {
                        self.inner.scheduler.cancel(id);
                    }
                    state.phase = Phase::Foreground;
                    debug!("resumed within grace window");
                    return;
                }
                Phase::Closed => {}
            }

            let now = self.inner.scheduler.now();
            state.phase = Phase::Foreground;
            state.session_start = Some(now);
            state.opened_from_notification = launch.opened_from_notification;
            let interval = minutes(state.max_minutes);
            state.periodic = Some(self.schedule_periodic(interval));
            info!(
                opened_from_notification = launch.opened_from_notification,
                interval_secs = interval.as_secs(),
                "application started"
            );
            ApplicationStartEvent {
                start_timestamp: now,
                opened_from_notification: launch.opened_from_notification,
                launch_data: launch.launch_data,
            }
        };

        self.inner
            .events
            .publish(LocalEvent::ApplicationStarted(started));
        self.inner.trigger.request_sync();
    }

    /// The host moved the app to the background.
    pub fn on_paused(&self) {
        let mut state = self.lock();
        if state.phase != Phase::Foreground {
            return;
        }
        state.phase = Phase::Pausing;
        state.pause_generation += 1;
        let generation = state.pause_generation;
        let weak = Arc::downgrade(&self.inner);
        let task = self.inner.scheduler.schedule_once(
            self.inner.grace,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    AppLifecycle { inner }.grace_expired(generation);
                }
            }),
        );
        state.stop_task = Some(task);
        debug!(grace_ms = self.inner.grace.as_millis() as u64, "paused, grace window started");
    }

    /// Changes the periodic re-sync interval. Zero falls back to the default.
    pub fn set_max_minutes_without_exchange(&self, max_minutes: u64) {
        let mut state = self.lock();
        state.max_minutes = effective_minutes(max_minutes);
        if let Some(id) = state.periodic.take() {
            self.inner.scheduler.cancel(id);
            state.periodic = Some(self.schedule_periodic(minutes(state.max_minutes)));
        }
    }

    /// Cancels every timer without emitting a stop event.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        for id in [state.periodic.take(), state.stop_task.take()].into_iter().flatten() {
            self.inner.scheduler.cancel(id);
        }
        state.phase = Phase::Closed;
        state.session_start = None;
    }

    fn grace_expired(&self, generation: u64) {
        let stopped = {
            let mut state = self.lock();
            if state.phase != Phase::Pausing || state.pause_generation != generation {
                return;
            }
            state.phase = Phase::Closed;
            state.stop_task = None;
            if let Some(id) = state.periodic.take() {
                self.inner.scheduler.cancel(id);
            }
            let stop = self.inner.scheduler.now();
            let start = state.session_start.take().unwrap_or(stop);
            ApplicationStopEvent {
                start_timestamp: start,
                stop_timestamp: stop,
                opened_from_notification: state.opened_from_notification,
            }
        };
        info!(
            session_secs = (stopped.stop_timestamp - stopped.start_timestamp).num_seconds(),
            "application stopped"
        );
        self.inner
            .events
            .publish(LocalEvent::ApplicationStopped(stopped));
    }

    fn schedule_periodic(&self, interval: Duration) -> TaskId {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule_repeating(
            interval,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    debug!("periodic synchronization");
                    inner.trigger.request_sync();
                }
            }),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn effective_minutes(max_minutes: u64) -> u64 {
    if max_minutes == 0 {
        warn!(
            default = DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE,
            "max minutes without exchange must be positive, using default"
        );
        DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE
    } else {
        max_minutes
    }
}

fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
