// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;
use serde_json::Map;
use tempfile::tempdir;

fn notification(n: i64) -> OutboundNotification {
    let at = Utc.timestamp_millis_opt(n * 1_000).single().unwrap();
    OutboundNotification::new(format!("Type{n}"), Map::new(), at)
}

fn exercise_queue(store: &dyn SyncStore) {
    assert!(store.load_pending().unwrap().is_empty());

    let a = notification(1);
    let b = notification(2);
    let c = notification(3);
    store.append_pending(&a).unwrap();
    store.append_pending(&b).unwrap();
    store.append_pending(&c).unwrap();
    assert_eq!(store.load_pending().unwrap(), vec![a.clone(), b.clone(), c.clone()]);

    store.save_pending(&[c.clone()]).unwrap();
    assert_eq!(store.load_pending().unwrap(), vec![c]);

    store.save_pending(&[]).unwrap();
    assert!(store.load_pending().unwrap().is_empty());
}

#[test]
fn memory_store_queue_preserves_order() {
    exercise_queue(&MemoryStore::new());
}

#[test]
fn file_store_queue_preserves_order() {
    let dir = tempdir().unwrap();
    exercise_queue(&FileStore::open(dir.path()).unwrap());
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let a = notification(1);
    {
        let store = FileStore::open(dir.path()).unwrap();
        store.append_pending(&a).unwrap();
        store
            .set_last_sync(Utc.timestamp_millis_opt(9_000).single().unwrap())
            .unwrap();
    }

    let store = FileStore::open(dir.path()).unwrap();
    assert_eq!(store.load_pending().unwrap(), vec![a]);
    assert_eq!(
        store.last_sync().unwrap(),
        Some(Utc.timestamp_millis_opt(9_000).single().unwrap())
    );
}

#[test]
fn file_store_creates_missing_directory() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let store = FileStore::open(&nested).unwrap();
    assert!(store.queue_path().exists());
    assert_eq!(store.last_sync().unwrap(), None);
}

#[test]
fn file_store_skips_blank_lines() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    store.append_pending(&notification(1)).unwrap();

    let mut file = OpenOptions::new()
        .append(true)
        .open(store.queue_path())
        .unwrap();
    writeln!(file).unwrap();
    writeln!(file, "   ").unwrap();

    store.append_pending(&notification(2)).unwrap();
    assert_eq!(store.load_pending().unwrap().len(), 2);
}

#[test]
fn file_store_rejects_corrupt_line() {
    let dir = tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    fs::write(store.queue_path(), "{not json}\n").unwrap();
    assert!(matches!(
        store.load_pending(),
        Err(StoreError::Serialization(_))
    ));
}

#[test]
fn memory_store_last_sync_roundtrip() {
    let store = MemoryStore::new();
    assert_eq!(store.last_sync().unwrap(), None);
    let at = Utc.timestamp_millis_opt(5).single().unwrap();
    store.set_last_sync(at).unwrap();
    assert_eq!(store.last_sync().unwrap(), Some(at));
}
