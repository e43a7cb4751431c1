// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

#[test]
fn system_clock_is_after_2020() {
    // 2020-01-01T00:00:00Z
    assert!(SystemClock.now_ms() > 1_577_836_800_000);
}

#[test]
fn manual_clock_advances_shared_time() {
    let clock = ManualClock::new(1_000);
    let handle = clock.clone();

    handle.advance(Duration::from_millis(250));

    assert_eq!(clock.now_ms(), 1_250);
}

#[test]
fn manual_clock_never_moves_backwards() {
    let clock = ManualClock::new(5_000);
    clock.set_ms(4_000);
    assert_eq!(clock.now_ms(), 5_000);

    clock.set_ms(6_000);
    assert_eq!(clock.now_ms(), 6_000);
}

#[test]
fn now_converts_milliseconds_to_utc() {
    let clock = ManualClock::new(1_700_000_000_123);
    let now = clock.now();
    assert_eq!(now.timestamp_millis(), 1_700_000_000_123);
}

#[test]
fn arc_clock_delegates() {
    let clock = Arc::new(ManualClock::new(42));
    assert_eq!(ClockSource::now_ms(&clock), 42);
}
