// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent-channel transport.
//!
//! A thin adapter: availability is the monitor's connection state and a send
//! is one correlated request on the open link.

use donky_core::{SyncRequest, SyncResponse};

use super::{Transport, TransportFuture, TransportKind};
use crate::channel::ConnectionMonitor;

pub struct PersistentTransport {
    monitor: ConnectionMonitor,
}

impl PersistentTransport {
    pub fn new(monitor: ConnectionMonitor) -> Self {
        PersistentTransport { monitor }
    }
}

impl Transport for PersistentTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Persistent
    }

    fn is_available(&self) -> bool {
        self.monitor.is_connected()
    }

    fn send<'a>(&'a self, request: &'a SyncRequest) -> TransportFuture<'a, SyncResponse> {
        Box::pin(self.monitor.request(request))
    }
}
