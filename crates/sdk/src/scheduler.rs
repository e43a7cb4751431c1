// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Timer abstraction for the lifecycle timer.
//!
//! [`TokioScheduler`] runs tasks on the tokio runtime; [`ManualScheduler`]
//! runs them only when a test advances its clock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use donky_core::{ClockSource, ManualClock};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Task run once after a delay.
pub type OnceTask = Box<dyn FnOnce() + Send>;
/// Task run on every tick of an interval.
pub type RepeatingTask = Box<dyn FnMut() + Send>;

/// Handle used to cancel a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

pub trait Scheduler: Send + Sync {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TaskId;

    /// First run is one `interval` from now.
    fn schedule_repeating(&self, interval: Duration, task: RepeatingTask) -> TaskId;

    /// Cancels a task. Unknown or finished ids are ignored.
    fn cancel(&self, id: TaskId);

    fn now(&self) -> DateTime<Utc>;
}

/// Scheduler backed by tokio timers.
pub struct TokioScheduler {
    runtime: Handle,
    clock: Arc<dyn ClockSource>,
    tasks: Arc<Mutex<HashMap<TaskId, AbortHandle>>>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    pub fn new(runtime: Handle, clock: Arc<dyn ClockSource>) -> Self {
        TokioScheduler {
            runtime,
            clock,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Number of tasks not yet finished or cancelled.
    pub fn active_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TaskId {
        let id = self.next_id();
        let tasks = Arc::clone(&self.tasks);
        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            task();
        });
        guard.insert(id, handle.abort_handle());
        id
    }

    fn schedule_repeating(&self, interval: Duration, mut task: RepeatingTask) -> TaskId {
        let id = self.next_id();
        let interval = interval.max(Duration::from_millis(1));
        let handle = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                task();
            }
        });
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle.abort_handle());
        id
    }

    fn cancel(&self, id: TaskId) {
        if let Some(handle) = self.tasks.lock().unwrap_or_else(|e| e.into_inner()).remove(&id) {
            handle.abort();
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

enum ManualTask {
    Once(OnceTask),
    Repeating {
        interval_ms: u64,
        task: RepeatingTask,
    },
}

#[derive(Default)]
struct ManualState {
    next_id: u64,
    /// Keyed by (due time, id) so equal due times run in schedule order.
    entries: BTreeMap<(u64, TaskId), ManualTask>,
    running: Option<TaskId>,
    running_cancelled: bool,
}

/// Deterministic scheduler for tests: tasks run inside [`advance`].
///
/// [`advance`]: ManualScheduler::advance
#[derive(Clone)]
pub struct ManualScheduler {
    clock: ManualClock,
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new(clock: ManualClock) -> Self {
        ManualScheduler {
            clock,
            state: Arc::new(Mutex::new(ManualState::default())),
        }
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Number of scheduled tasks.
    pub fn pending_count(&self) -> usize {
        self.lock().entries.len()
    }

    /// Moves time forward by `by`, running every task that falls due, in due
    /// order. Tasks run with no lock held and may schedule or cancel.
    pub fn advance(&self, by: Duration) {
        let target = self.clock.now_ms().saturating_add(by.as_millis() as u64);
        loop {
            let next = {
                let mut state = self.lock();
                let due = state
                    .entries
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(due_ms, _)| *due_ms <= target);
                match due {
                    Some(key) => {
                        state.running = Some(key.1);
                        state.running_cancelled = false;
                        state.entries.remove(&key).map(|task| (key, task))
                    }
                    None => None,
                }
            };
            let Some(((due_ms, id), task)) = next else {
                break;
            };

            self.clock.set_ms(due_ms);
            match task {
                ManualTask::Once(task) => {
                    task();
                    self.lock().running = None;
                }
                ManualTask::Repeating {
                    interval_ms,
                    mut task,
                } => {
                    task();
                    let mut state = self.lock();
                    state.running = None;
                    if !state.running_cancelled {
                        state.entries.insert(
                            (due_ms.saturating_add(interval_ms), id),
                            ManualTask::Repeating { interval_ms, task },
                        );
                    }
                }
            }
        }
        self.clock.set_ms(target);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, delay: Duration, task: ManualTask) -> TaskId {
        let due = self.clock.now_ms().saturating_add(delay.as_millis() as u64);
        let mut state = self.lock();
        state.next_id += 1;
        let id = TaskId(state.next_id);
        state.entries.insert((due, id), task);
        id
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: OnceTask) -> TaskId {
        self.insert(delay, ManualTask::Once(task))
    }

    fn schedule_repeating(&self, interval: Duration, task: RepeatingTask) -> TaskId {
        let interval_ms = (interval.as_millis() as u64).max(1);
        self.insert(
            Duration::from_millis(interval_ms),
            ManualTask::Repeating { interval_ms, task },
        )
    }

    fn cancel(&self, id: TaskId) {
        let mut state = self.lock();
        let key = state.entries.keys().find(|(_, task_id)| *task_id == id).copied();
        match key {
            Some(key) => {
                state.entries.remove(&key);
            }
            None if state.running == Some(id) => state.running_cancelled = true,
            None => {}
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
