// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use chrono::TimeZone;
use donky_core::notification::ACKNOWLEDGEMENT_TYPE;
use serde_json::Map;

use super::*;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap()
}

fn donky(id: &str, kind: &str) -> ServerNotification {
    ServerNotification::donky(id, kind, Map::new(), at(0))
}

fn custom(id: &str, custom_type: &str) -> ServerNotification {
    ServerNotification::custom(id, custom_type, Map::new(), at(0))
}

fn module(name: &str) -> ModuleDefinition {
    ModuleDefinition::new(name, "1.0.0")
}

/// Records every batch a listener receives, as lists of ids.
fn recorder() -> (Arc<Mutex<Vec<Vec<String>>>>, impl Fn(&[ServerNotification]) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener = move |batch: &[ServerNotification]| {
        sink.lock()
            .unwrap()
            .push(batch.iter().map(|n| n.id.clone()).collect());
    };
    (seen, listener)
}

#[test]
fn batch_listener_receives_matches_in_order() {
    let registry = SubscriptionRegistry::new();
    let (seen, listener) = recorder();
    registry.subscribe_batch(module("chat"), NotificationCategory::Custom, "chat", false, listener);

    registry.dispatch(
        &[custom("1", "chat"), custom("2", "other"), custom("3", "chat")],
        at(0),
    );

    assert_eq!(*seen.lock().unwrap(), vec![vec!["1".to_string(), "3".to_string()]]);
}

#[test]
fn single_listener_is_called_per_notification() {
    let registry = SubscriptionRegistry::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    registry.subscribe(
        module("reads"),
        NotificationCategory::Donky,
        "SyncMessageRead",
        false,
        move |n: &ServerNotification| sink.lock().unwrap().push(n.id.clone()),
    );

    registry.dispatch(
        &[donky("a", "SyncMessageRead"), donky("b", "SyncMessageRead")],
        at(0),
    );

    assert_eq!(*calls.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn category_is_part_of_the_key() {
    let registry = SubscriptionRegistry::new();
    let (seen, listener) = recorder();
    registry.subscribe_batch(module("m"), NotificationCategory::Donky, "chat", false, listener);

    registry.dispatch(&[custom("1", "chat")], at(0));

    assert!(seen.lock().unwrap().is_empty());
}

#[test]
fn auto_acknowledge_enqueues_one_ack_per_notification() {
    let registry = SubscriptionRegistry::new();
    registry.subscribe_batch(module("a"), NotificationCategory::Custom, "chat", true, |_: &[ServerNotification]| {});
    registry.subscribe_batch(module("b"), NotificationCategory::Custom, "chat", true, |_: &[ServerNotification]| {});

    let acks = registry.dispatch(&[custom("1", "chat"), custom("2", "chat")], at(7_000));

    assert_eq!(acks.len(), 2);
    assert!(acks.iter().all(|a| a.notification_type == ACKNOWLEDGEMENT_TYPE));
    assert_eq!(acks[0].payload["serverNotificationId"], "1");
    assert_eq!(acks[1].payload["serverNotificationId"], "2");
    assert_eq!(acks[0].created_at, at(7_000));
}

#[test]
fn no_ack_without_auto_acknowledge_or_subscription() {
    let registry = SubscriptionRegistry::new();
    registry.subscribe_batch(module("a"), NotificationCategory::Custom, "chat", false, |_: &[ServerNotification]| {});

    let acks = registry.dispatch(&[custom("1", "chat"), custom("2", "unmatched")], at(0));

    assert!(acks.is_empty());
}

#[test]
fn duplicate_ids_are_dispatched_once() {
    let registry = SubscriptionRegistry::new();
    let (seen, listener) = recorder();
    registry.subscribe_batch(module("m"), NotificationCategory::Custom, "chat", true, listener);

    let first = registry.dispatch(&[custom("1", "chat"), custom("1", "chat")], at(0));
    let second = registry.dispatch(&[custom("1", "chat")], at(0));

    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![vec!["1".to_string()]]);
}

#[test]
fn dedup_window_forgets_oldest_ids() {
    let registry = SubscriptionRegistry::new();
    let (seen, listener) = recorder();
    registry.subscribe_batch(module("m"), NotificationCategory::Custom, "chat", false, listener);

    let flood: Vec<_> = (0..=DEDUP_WINDOW)
        .map(|i| custom(&format!("n{i}"), "chat"))
        .collect();
    registry.dispatch(&flood, at(0));
    // n0 has been pushed out of the window, n512 is still remembered.
    registry.dispatch(&[custom("n0", "chat"), custom(&format!("n{DEDUP_WINDOW}"), "chat")], at(0));

    let batches = seen.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1], vec!["n0".to_string()]);
}

#[test]
fn unsubscribe_by_module_and_type() {
    let registry = SubscriptionRegistry::new();
    let (seen_a, listener_a) = recorder();
    let (seen_b, listener_b) = recorder();
    registry.subscribe_batch(module("a"), NotificationCategory::Custom, "chat", false, listener_a);
    registry.subscribe_batch(module("b"), NotificationCategory::Custom, "chat", false, listener_b);
    assert_eq!(registry.subscription_count(), 2);

    assert_eq!(registry.unsubscribe("a", NotificationCategory::Custom, "chat"), 1);
    assert_eq!(registry.unsubscribe("a", NotificationCategory::Custom, "chat"), 0);
    registry.dispatch(&[custom("1", "chat")], at(0));

    assert!(seen_a.lock().unwrap().is_empty());
    assert_eq!(seen_b.lock().unwrap().len(), 1);
}

#[test]
fn unsubscribe_by_id() {
    let registry = SubscriptionRegistry::new();
    let id = registry.subscribe_batch(module("a"), NotificationCategory::Donky, "X", false, |_: &[ServerNotification]| {});
    assert!(registry.unsubscribe_id(id));
    assert!(!registry.unsubscribe_id(id));
    assert_eq!(registry.subscription_count(), 0);
}

#[test]
fn listener_may_reenter_registry() {
    let registry = Arc::new(SubscriptionRegistry::new());
    let inner = Arc::downgrade(&registry);
    registry.subscribe_batch(module("a"), NotificationCategory::Donky, "X", false, move |_: &[ServerNotification]| {
        if let Some(registry) = inner.upgrade() {
            registry.subscribe_batch(module("late"), NotificationCategory::Donky, "Y", false, |_: &[ServerNotification]| {});
        }
    });

    registry.dispatch(&[donky("1", "X")], at(0));

    assert_eq!(registry.subscription_count(), 2);
}
