// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::sync::Arc;

use donky_core::FieldError;
use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Terminal outcome of a failed synchronization round.
///
/// Every caller attached to a round receives its own clone, so the variants
/// carry owned, cloneable data only. Transport-level errors are classified
/// into one of these before they leave the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("backend returned retryable status {status}")]
    Retryable { status: u16 },

    #[error("backend rejected the request: {}", format_field_errors(.0))]
    ValidationFailure(Vec<FieldError>),

    #[error("not authorized\n  hint: re-authentication failed, check the API key")]
    Unauthorized,

    #[error("account suspended\n  hint: synchronization resumes after clear_suspension()")]
    Suspended,

    #[error("no transport available")]
    TransportUnavailable,

    #[error("retries exhausted (last status: {})", format_status(.last_status))]
    RetriesExhausted { last_status: Option<u16> },

    #[error("storage error: {0}")]
    Storage(#[source] SharedStoreError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("synchronization aborted")]
    Aborted,
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Storage(SharedStoreError(Arc::new(e)))
    }
}

/// A [`StoreError`] shared by every caller attached to a failed round.
///
/// Two shared errors are equal when they render the same message.
#[derive(Debug, Clone)]
pub struct SharedStoreError(Arc<StoreError>);

impl AsRef<StoreError> for SharedStoreError {
    fn as_ref(&self) -> &StoreError {
        &self.0
    }
}

impl fmt::Display for SharedStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for SharedStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl PartialEq for SharedStoreError {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.to_string() == other.0.to_string()
    }
}

impl Eq for SharedStoreError {}

fn format_field_errors(errors: &[FieldError]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

/// All errors surfaced by the SDK's setup and command-line paths.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no tokio runtime\n  hint: build the SDK inside a runtime or pass a runtime handle")]
    NoRuntime,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
