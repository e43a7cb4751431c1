// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted transport for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use donky_core::{ServerNotification, SyncRequest, SyncResponse};
use tokio::sync::Semaphore;

use super::{Transport, TransportError, TransportFuture, TransportKind, TransportResult};

/// Pops one scripted outcome per send; an empty script answers with an
/// empty response.
pub(crate) struct MockTransport {
    pub(crate) kind: TransportKind,
    pub(crate) available: AtomicBool,
    pub(crate) script: Mutex<VecDeque<TransportResult<SyncResponse>>>,
    pub(crate) sent: Mutex<Vec<SyncRequest>>,
    pub(crate) gate: Mutex<Option<Arc<Semaphore>>>,
    pub(crate) fetchable: Mutex<HashMap<String, ServerNotification>>,
}

impl MockTransport {
    pub(crate) fn new(kind: TransportKind, available: bool) -> Arc<Self> {
        Arc::new(MockTransport {
            kind,
            available: AtomicBool::new(available),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
            fetchable: Mutex::new(HashMap::new()),
        })
    }

    pub(crate) fn push(&self, outcome: TransportResult<SyncResponse>) {
        self.script.lock().unwrap_or_else(|e| e.into_inner()).push_back(outcome);
    }

    pub(crate) fn fail(&self, code: u16) {
        self.push(Err(TransportError::Status {
            code,
            retry_after: None,
        }));
    }

    /// Holds every send until the returned semaphore gets permits.
    pub(crate) fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn sent(&self) -> Vec<SyncRequest> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub(crate) fn sent_ids(&self, index: usize) -> Vec<String> {
        self.sent()[index]
            .client_notifications
            .iter()
            .map(|n| n.id.clone())
            .collect()
    }
}

impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn send<'a>(&'a self, request: &'a SyncRequest) -> TransportFuture<'a, SyncResponse> {
        Box::pin(async move {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());
            let gate = self.gate.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            self.script
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_front()
                .unwrap_or_else(|| Ok(SyncResponse::default()))
        })
    }

    fn fetch<'a>(&'a self, notification_id: &'a str) -> TransportFuture<'a, ServerNotification> {
        Box::pin(async move {
            self.fetchable
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(notification_id)
                .cloned()
                .ok_or_else(|| TransportError::Unavailable("not found".into()))
        })
    }
}
