// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};

use donky_core::ManualClock;
use serde_json::json;
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::events::EventStream;
use crate::scheduler::ManualScheduler;

#[derive(Default)]
struct CountingTrigger {
    calls: AtomicUsize,
}

impl CountingTrigger {
    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SyncTrigger for CountingTrigger {
    fn request_sync(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    lifecycle: AppLifecycle,
    scheduler: ManualScheduler,
    trigger: Arc<CountingTrigger>,
    events: EventStream,
}

fn fixture() -> Fixture {
    fixture_with(LifecycleConfig::default())
}

fn fixture_with(config: LifecycleConfig) -> Fixture {
    let scheduler = ManualScheduler::new(ManualClock::new(1_700_000_000_000));
    let trigger = Arc::new(CountingTrigger::default());
    let bus = EventBus::new();
    let events = bus.subscribe();
    let lifecycle = AppLifecycle::new(
        config,
        Arc::new(scheduler.clone()),
        trigger.clone(),
        bus,
    );
    Fixture {
        lifecycle,
        scheduler,
        trigger,
        events,
    }
}

fn stop_events(events: &mut EventStream) -> Vec<ApplicationStopEvent> {
    let mut stops = Vec::new();
    loop {
        match events.try_recv() {
            Ok(LocalEvent::ApplicationStopped(stop)) => stops.push(stop),
            Ok(_) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return stops,
            Err(TryRecvError::Lagged(_)) => {}
        }
    }
}

#[test]
fn resume_starts_session_and_syncs_immediately() {
    let mut f = fixture();

    f.lifecycle.on_resumed(LaunchContext::default());

    assert_eq!(f.lifecycle.phase(), Phase::Foreground);
    assert_eq!(f.trigger.count(), 1);
    match f.events.try_recv().unwrap() {
        LocalEvent::ApplicationStarted(start) => {
            assert_eq!(Some(start.start_timestamp), f.lifecycle.session_start());
            assert!(!start.opened_from_notification);
            assert_eq!(start.launch_data, None);
        }
        other => unreachable!("unexpected event {other:?}"),
    }
}

#[test]
fn launch_context_is_carried_into_events() {
    let mut f = fixture();
    let data = json!({"messageId": "m1"});

    f.lifecycle
        .on_resumed(LaunchContext::from_notification(Some(data.clone())));
    let Ok(LocalEvent::ApplicationStarted(start)) = f.events.try_recv() else {
        unreachable!("expected start event");
    };
    assert!(start.opened_from_notification);
    assert_eq!(start.launch_data, Some(data));

    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(6_000));
    let stops = stop_events(&mut f.events);
    assert_eq!(stops.len(), 1);
    assert!(stops[0].opened_from_notification);
}

#[test]
fn repeated_resume_does_not_restart_session() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());
    let _ = f.events.try_recv();

    f.lifecycle.on_resumed(LaunchContext::default());

    assert_eq!(f.trigger.count(), 1);
    assert!(matches!(f.events.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn periodic_sync_runs_every_interval_while_foregrounded() {
    let f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());

    f.scheduler.advance(Duration::from_secs(5 * 60));
    assert_eq!(f.trigger.count(), 2);

    f.scheduler.advance(Duration::from_secs(10 * 60));
    assert_eq!(f.trigger.count(), 4);
}

#[test]
fn resume_within_grace_does_not_stop() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());

    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(4_000));
    f.lifecycle.on_resumed(LaunchContext::default());
    f.scheduler.advance(Duration::from_millis(10_000));

    assert!(stop_events(&mut f.events).is_empty());
    assert_eq!(f.lifecycle.phase(), Phase::Foreground);
    assert_eq!(f.trigger.count(), 1);
}

#[test]
fn pause_past_grace_stops_exactly_once() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());

    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(6_000));
    f.scheduler.advance(Duration::from_secs(60));

    let stops = stop_events(&mut f.events);
    assert_eq!(stops.len(), 1);
    assert!(stops[0].start_timestamp <= stops[0].stop_timestamp);
    assert_eq!(
        (stops[0].stop_timestamp - stops[0].start_timestamp).num_milliseconds(),
        5_000
    );
    assert_eq!(f.lifecycle.phase(), Phase::Closed);
    assert_eq!(f.lifecycle.session_start(), None);
}

#[test]
fn stop_cancels_periodic_sync() {
    let f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());
    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(6_000));

    f.scheduler.advance(Duration::from_secs(30 * 60));

    assert_eq!(f.trigger.count(), 1);
    assert_eq!(f.scheduler.pending_count(), 0);
}

#[test]
fn periodic_sync_continues_during_grace_window() {
    let config = LifecycleConfig {
        grace: Duration::from_secs(90),
        max_minutes_without_exchange: 1,
    };
    let f = fixture_with(config);
    f.lifecycle.on_resumed(LaunchContext::default());
    f.lifecycle.on_paused();

    f.scheduler.advance(Duration::from_secs(60));

    assert_eq!(f.trigger.count(), 2);
}

#[test]
fn second_pause_restarts_grace_window() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());

    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(3_000));
    f.lifecycle.on_resumed(LaunchContext::default());
    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(3_000));
    assert!(stop_events(&mut f.events).is_empty());

    f.scheduler.advance(Duration::from_millis(2_000));
    assert_eq!(stop_events(&mut f.events).len(), 1);
}

#[test]
fn pause_without_session_is_ignored() {
    let mut f = fixture();
    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(10_000));

    assert!(stop_events(&mut f.events).is_empty());
    assert_eq!(f.scheduler.pending_count(), 0);
}

#[test]
fn new_session_after_close() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());
    f.lifecycle.on_paused();
    f.scheduler.advance(Duration::from_millis(6_000));

    f.lifecycle.on_resumed(LaunchContext::default());

    assert_eq!(f.trigger.count(), 2);
    assert_eq!(f.lifecycle.phase(), Phase::Foreground);
    let started: Vec<_> = std::iter::from_fn(|| f.events.try_recv().ok())
        .filter(|e| matches!(e, LocalEvent::ApplicationStarted(_)))
        .collect();
    assert_eq!(started.len(), 2);
}

#[test]
fn zero_interval_falls_back_to_default() {
    let f = fixture_with(LifecycleConfig {
        grace: DEFAULT_GRACE,
        max_minutes_without_exchange: 0,
    });
    assert_eq!(f.lifecycle.sync_interval(), Duration::from_secs(5 * 60));

    f.lifecycle.set_max_minutes_without_exchange(0);
    assert_eq!(f.lifecycle.sync_interval(), Duration::from_secs(5 * 60));
}

#[test]
fn changing_interval_reschedules_periodic_sync() {
    let f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());

    f.lifecycle.set_max_minutes_without_exchange(1);
    f.scheduler.advance(Duration::from_secs(60));

    assert_eq!(f.trigger.count(), 2);
    assert_eq!(f.scheduler.pending_count(), 1);
}

#[test]
fn shutdown_cancels_timers_silently() {
    let mut f = fixture();
    f.lifecycle.on_resumed(LaunchContext::default());
    let _ = f.events.try_recv();
    f.lifecycle.on_paused();

    f.lifecycle.shutdown();
    f.scheduler.advance(Duration::from_secs(600));

    assert_eq!(f.scheduler.pending_count(), 0);
    assert!(stop_events(&mut f.events).is_empty());
    assert_eq!(f.trigger.count(), 1);
}
