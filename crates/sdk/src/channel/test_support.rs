// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-process connector for tests: each successful connect hands the test a
//! [`MockServerSide`] to play the backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use donky_core::{ClientFrame, ServerFrame, SyncRequest};
use tokio::sync::mpsc;

use super::{ChannelConnector, ChannelLink, ConnectFuture};
use crate::transport::TransportError;

pub(crate) struct MockConnector {
    tokens: Mutex<Vec<Option<String>>>,
    fail_remaining: AtomicU32,
    sides: mpsc::UnboundedSender<MockServerSide>,
}

impl MockConnector {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MockServerSide>) {
        let (sides, sides_rx) = mpsc::unbounded_channel();
        let connector = MockConnector {
            tokens: Mutex::new(Vec::new()),
            fail_remaining: AtomicU32::new(0),
            sides,
        };
        (Arc::new(connector), sides_rx)
    }

    /// Makes the next `n` connect attempts fail.
    pub(crate) fn fail_next(&self, n: u32) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Tokens presented on each attempt, in order.
    pub(crate) fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ChannelConnector for MockConnector {
    fn connect<'a>(&'a self, _url: &'a str, token: Option<&'a str>) -> ConnectFuture<'a> {
        Box::pin(async move {
            self.tokens
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(token.map(str::to_string));

            let failing = self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(TransportError::Network("mock connect failure".into()));
            }

            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            let _ = self.sides.send(MockServerSide {
                from_client: out_rx,
                to_client: in_tx,
            });
            Ok(ChannelLink {
                outgoing: out_tx,
                incoming: in_rx,
            })
        })
    }
}

/// The backend's end of a mock link. Dropping it closes the link.
pub(crate) struct MockServerSide {
    pub(crate) from_client: mpsc::Receiver<ClientFrame>,
    pub(crate) to_client: mpsc::Sender<ServerFrame>,
}

impl MockServerSide {
    /// Waits for the next synchronise frame, skipping pings.
    pub(crate) async fn next_sync(&mut self) -> Option<(u64, SyncRequest)> {
        while let Some(frame) = self.from_client.recv().await {
            if let ClientFrame::Synchronise {
                request_id,
                request,
            } = frame
            {
                return Some((request_id, request));
            }
        }
        None
    }

    pub(crate) async fn reply(&self, frame: ServerFrame) {
        let _ = self.to_client.send(frame).await;
    }
}
