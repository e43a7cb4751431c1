// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for synchronization rounds.
//!
//! Both transports answer the same question: "send these queued client
//! notifications, give me the server's synchronization result".
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Coordinator  │────►│  Transport  │────►│   Backend   │
//! │              │◄────│   (trait)   │◄────│             │
//! └──────────────┘     └─────────────┘     └─────────────┘
//!                        │         │
//!                   RestTransport  PersistentTransport
//!                   (reqwest)      (ConnectionMonitor link)
//! ```

mod persistent;
mod rest;

pub use persistent::PersistentTransport;
pub use rest::RestTransport;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use donky_core::{FieldError, ServerNotification, SyncRequest, SyncResponse};

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The backend answered with a non-success status.
    #[error("backend returned status {code}")]
    Status {
        code: u16,
        /// Server-provided `Retry-After` hint.
        retry_after: Option<Duration>,
    },

    /// The backend rejected the request body (HTTP 400).
    #[error("validation failed ({} field errors)", .0.len())]
    Validation(Vec<FieldError>),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// Connection could not be established or broke mid-request.
    #[error("network error: {0}")]
    Network(String),

    /// The transport cannot be used right now (not connected, stale link).
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// Connection closed while the request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Boxed future returned by transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = TransportResult<T>> + Send + 'a>>;

/// Which transport carried a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Rest,
    Persistent,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Rest => f.write_str("rest"),
            TransportKind::Persistent => f.write_str("persistent"),
        }
    }
}

/// A channel able to run one synchronization exchange.
///
/// This trait abstracts over the actual transport mechanism, allowing
/// for easy testing with mock implementations.
pub trait Transport: Send + Sync {
    /// Identifies the transport in reports and logs.
    fn kind(&self) -> TransportKind;

    /// Whether a send could be attempted right now.
    fn is_available(&self) -> bool {
        true
    }

    /// Sends the queued batch and returns the server's result.
    fn send<'a>(&'a self, request: &'a SyncRequest) -> TransportFuture<'a, SyncResponse>;

    /// Fetches a single server notification by id.
    fn fetch<'a>(&'a self, notification_id: &'a str) -> TransportFuture<'a, ServerNotification> {
        let _ = notification_id;
        Box::pin(async {
            Err(TransportError::Unavailable(
                "fetch by id not supported".to_string(),
            ))
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support;
