// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent channel to the backend.
//!
//! A [`ChannelConnector`] opens one link (a pair of frame queues pumped by
//! background tasks). The [`ConnectionMonitor`] owns the link lifecycle:
//! connect with backoff, request/response correlation, push forwarding,
//! and reconnect after an unexpected drop.

mod connection;
mod websocket;

pub use connection::{
    ConnectionConfig, ConnectionMonitor, ConnectionState, PushPayload, SharedConnectionState,
    STATE_CONNECTED, STATE_CONNECTING, STATE_DISCONNECTED,
};
pub use websocket::WebSocketConnector;

use std::future::Future;
use std::pin::Pin;

use donky_core::{ClientFrame, ServerFrame};
use tokio::sync::mpsc;

use crate::transport::TransportResult;

/// An open persistent link.
///
/// Dropping `outgoing` closes the link; `incoming` yields `None` once the
/// remote side has gone away.
#[derive(Debug)]
pub struct ChannelLink {
    pub outgoing: mpsc::Sender<ClientFrame>,
    pub incoming: mpsc::Receiver<ServerFrame>,
}

/// Boxed future returned by [`ChannelConnector::connect`].
pub type ConnectFuture<'a> = Pin<Box<dyn Future<Output = TransportResult<ChannelLink>> + Send + 'a>>;

/// Opens persistent links.
pub trait ChannelConnector: Send + Sync {
    /// Connect to `url`, authenticating with `token` when present.
    fn connect<'a>(&'a self, url: &'a str, token: Option<&'a str>) -> ConnectFuture<'a>;
}

#[cfg(test)]
pub(crate) mod test_support;
