// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Subscription registry: routes inbound server notifications to the
//! modules that asked for them.
//!
//! Subscriptions are keyed by `(category, type)`. For Custom notifications
//! the type is the application-defined custom type. Listeners always
//! receive batches; single-notification listeners are wrapped.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use donky_core::{AcknowledgementResult, NotificationCategory, OutboundNotification, ServerNotification};
use tracing::debug;

/// Number of recently dispatched ids remembered for deduplication.
pub const DEDUP_WINDOW: usize = 512;

/// Batch listener invoked with every matching notification of a dispatch.
pub type BatchListener = Arc<dyn Fn(&[ServerNotification]) + Send + Sync>;

/// Identifies the module that owns a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleDefinition {
    pub name: String,
    pub version: String,
}

impl ModuleDefinition {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleDefinition {
            name: name.into(),
            version: version.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    module: ModuleDefinition,
    auto_acknowledge: bool,
    listener: BatchListener,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("auto_acknowledge", &self.auto_acknowledge)
            .finish_non_exhaustive()
    }
}

type ByType = HashMap<String, Vec<Subscription>>;

#[derive(Debug, Default)]
struct SeenWindow {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl SeenWindow {
    /// Records `id`; returns false if it was already in the window.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() == DEDUP_WINDOW {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

/// Routes server notifications to subscribed listeners.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<HashMap<NotificationCategory, ByType>>,
    next_id: AtomicU64,
    seen: Mutex<SeenWindow>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a listener that receives one notification at a time.
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
        self.subscribe_batch(
            module,
            category,
            notification_type,
            auto_acknowledge,
            move |batch: &[ServerNotification]| batch.iter().for_each(&listener),
        )
    }

    /// Subscribe a listener that receives all matching notifications of a
    /// dispatch in one call, in receive order.
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
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        debug!(
            module = %module.name,
            %category,
            notification_type,
            auto_acknowledge,
            "subscribing"
        );
        let subscription = Subscription {
            id,
            module,
            auto_acknowledge,
            listener: Arc::new(listener),
        };
        self.subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(category)
            .or_default()
            .entry(notification_type.to_string())
            .or_default()
            .push(subscription);
        id
    }

    /// Removes every subscription `module` holds for `(category, type)`.
    /// Returns how many were removed.
    pub fn unsubscribe(
        &self,
        module_name: &str,
        category: NotificationCategory,
        notification_type: &str,
    ) -> usize {
        let mut guard = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        let Some(by_type) = guard.get_mut(&category) else {
            return 0;
        };
        let Some(subs) = by_type.get_mut(notification_type) else {
            return 0;
        };
        let before = subs.len();
        subs.retain(|s| s.module.name != module_name);
        let removed = before - subs.len();
        if subs.is_empty() {
            by_type.remove(notification_type);
        }
        removed
    }

    /// Removes one subscription by id.
    pub fn unsubscribe_id(&self, id: SubscriptionId) -> bool {
        let mut guard = self.subscriptions.write().unwrap_or_else(|e| e.into_inner());
        for by_type in guard.values_mut() {
            for subs in by_type.values_mut() {
                if let Some(pos) = subs.iter().position(|s| s.id == id) {
                    subs.remove(pos);
                    return true;
                }
            }
        }
        false
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum()
    }

    /// Delivers `notifications` to matching listeners.
    ///
    /// Notifications already dispatched recently (by id) are skipped.
    /// Listeners run after the registry lock is released. Returns one
    /// acknowledgement per notification matched by at least one
    /// auto-acknowledging subscription.
    pub fn dispatch(
        &self,
        notifications: &[ServerNotification],
        now: DateTime<Utc>,
    ) -> Vec<OutboundNotification> {
        let fresh: Vec<&ServerNotification> = {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            notifications.iter().filter(|n| seen.insert(&n.id)).collect()
        };
        if fresh.len() < notifications.len() {
            debug!(
                skipped = notifications.len() - fresh.len(),
                "skipping already dispatched notifications"
            );
        }

        let mut batches: Vec<(Subscription, Vec<ServerNotification>)> = Vec::new();
        let mut batch_index: HashMap<SubscriptionId, usize> = HashMap::new();
        let mut acknowledgements = Vec::new();
        {
            let guard = self.subscriptions.read().unwrap_or_else(|e| e.into_inner());
            for notification in fresh {
                let subs = guard
                    .get(&notification.category)
                    .and_then(|by_type| by_type.get(notification.dispatch_key()));
                let Some(subs) = subs.filter(|s| !s.is_empty()) else {
                    debug!(
                        id = %notification.id,
                        key = notification.dispatch_key(),
                        "no subscription for notification"
                    );
                    continue;
                };

                for sub in subs {
                    let index = *batch_index.entry(sub.id).or_insert_with(|| {
                        batches.push((sub.clone(), Vec::new()));
                        batches.len() - 1
                    });
                    batches[index].1.push(notification.clone());
                }
                if subs.iter().any(|s| s.auto_acknowledge) {
                    acknowledgements.push(OutboundNotification::acknowledgement(
                        notification,
                        AcknowledgementResult::Delivered,
                        now,
                    ));
                }
            }
        }

        for (subscription, batch) in &batches {
            (subscription.listener)(batch);
        }
        acknowledgements
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
