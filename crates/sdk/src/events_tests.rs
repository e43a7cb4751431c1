// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tokio::sync::broadcast::error::TryRecvError;

#[test]
fn publish_without_subscribers_is_silent() {
    let bus = EventBus::new();
    bus.publish(LocalEvent::ChannelConnected);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn every_subscriber_receives_each_event() {
    let bus = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.clone().subscribe();

    bus.publish(LocalEvent::MessageRead {
        message_id: "m1".into(),
    });

    let expected = LocalEvent::MessageRead {
        message_id: "m1".into(),
    };
    assert_eq!(a.try_recv().unwrap(), expected);
    assert_eq!(b.try_recv().unwrap(), expected);
}

#[test]
fn late_subscriber_misses_earlier_events() {
    let bus = EventBus::new();
    bus.publish(LocalEvent::ChannelConnected);
    let mut rx = bus.subscribe();
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[test]
fn slow_subscriber_observes_lag() {
    let bus = EventBus::with_capacity(2);
    let mut rx = bus.subscribe();
    for _ in 0..4 {
        bus.publish(LocalEvent::ChannelDisconnected);
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(_))));
}
