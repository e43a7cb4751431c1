// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end tests running the SDK against an in-process donky-relay.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::time::Duration;

use chrono::Utc;
use serde_json::Map;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use donky::{
    LocalEvent, ModuleDefinition, NotificationCategory, Sdk, SdkConfig, ServerNotification,
    TransportKind,
};
use donky_relay::ServerState;

/// A relay bound to a random port, stopped when dropped.
struct Relay {
    state: ServerState,
    url: String,
    task: tokio::task::JoinHandle<()>,
}

impl Relay {
    async fn start() -> Self {
        let state = ServerState::default();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let serving = state.clone();
        let task = tokio::spawn(async move {
            let _ = donky_relay::serve(listener, serving).await;
        });
        Relay { state, url, task }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn config(relay: &Relay, state_dir: &tempfile::TempDir) -> SdkConfig {
    let mut config = SdkConfig {
        channel_url: relay.url.clone(),
        // Nothing listens here, so every REST attempt fails fast.
        rest_base_url: "http://127.0.0.1:9".into(),
        request_timeout_secs: 2,
        state_dir: Some(state_dir.path().to_path_buf()),
        ..SdkConfig::default()
    };
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 10;
    config.reconnect.heartbeat_interval_secs = 0;
    config
}

async fn connect(sdk: &Sdk) {
    let mut events = sdk.events();
    sdk.start_channel();
    let connected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(LocalEvent::ChannelConnected) = events.recv().await {
                break;
            }
        }
    })
    .await;
    assert!(connected.is_ok(), "channel did not connect");
}

fn simple_push(id: &str) -> ServerNotification {
    let mut data = Map::new();
    data.insert("body".into(), "hello".into());
    ServerNotification::donky(id, "SimplePush", data, Utc::now())
}

fn module() -> ModuleDefinition {
    ModuleDefinition::new("relay-tests", "1.0.0")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn channel_round_delivers_and_acknowledges() {
    let relay = Relay::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let sdk = Sdk::builder(config(&relay, &dir)).build().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    sdk.subscribe(
        module(),
        NotificationCategory::Donky,
        "SimplePush",
        true,
        move |n| {
            let _ = tx.send(n.id.clone());
        },
    );
    relay.state.enqueue(simple_push("n1")).await;
    connect(&sdk).await;

    let report = sdk.synchronize_now().await.unwrap();
    assert_eq!(report.transport, TransportKind::Persistent);
    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(delivered.as_deref(), Some("n1"));

    // The acknowledgement travels with the next round.
    sdk.synchronize_now().await.unwrap();
    let received = relay.state.received().await;
    assert!(received
        .iter()
        .any(|n| n.notification_type == "Acknowledgement"
            && n.payload["serverNotificationId"] == "n1"));
    assert_eq!(sdk.coordinator().pending_count(), 0);

    sdk.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pushed_notification_reaches_subscriber() {
    let relay = Relay::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let sdk = Sdk::builder(config(&relay, &dir)).build().unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    sdk.subscribe(
        module(),
        NotificationCategory::Donky,
        "SimplePush",
        false,
        move |n| {
            let _ = tx.send(n.id.clone());
        },
    );
    connect(&sdk).await;

    relay.state.push(vec![simple_push("p1")]);

    let delivered = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(delivered.as_deref(), Some("p1"));
    sdk.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_round_keeps_queue_for_next_round() {
    let relay = Relay::start().await;
    let dir = tempfile::TempDir::new().unwrap();
    let sdk = Sdk::builder(config(&relay, &dir)).build().unwrap();
    connect(&sdk).await;
    sdk.synchronize_now().await.unwrap();

    relay.state.fail_next(500, "backend down").await;
    sdk.mark_message_read("m1").unwrap();

    // The channel fails and the REST fallback cannot connect.
    assert!(sdk.synchronize_now().await.is_err());
    assert_eq!(sdk.coordinator().pending_count(), 1);
    assert!(relay.state.received().await.is_empty());

    let report = sdk.synchronize_now().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(sdk.coordinator().pending_count(), 0);
    let received = relay.state.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload["messageId"], "m1");

    sdk.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_survives_restart() {
    let relay = Relay::start().await;
    let dir = tempfile::TempDir::new().unwrap();

    {
        let sdk = Sdk::builder(config(&relay, &dir)).build().unwrap();
        sdk.send_custom("score", serde_json::json!({"points": 3}))
            .unwrap();
        sdk.shutdown();
    }

    let sdk = Sdk::builder(config(&relay, &dir)).build().unwrap();
    assert_eq!(sdk.coordinator().pending_count(), 1);
    connect(&sdk).await;
    sdk.synchronize_now().await.unwrap();

    let received = relay.state.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload["customType"], "score");
    sdk.shutdown();
}
