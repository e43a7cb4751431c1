// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry decisions for synchronization rounds.
//!
//! [`RetryPolicy`] is the static configuration; a [`RetryState`] is created
//! per round and tracks how many attempts have been made and what the last
//! failure looked like.

use std::time::Duration;

use donky_core::FieldError;

use crate::error::SyncError;
use crate::transport::TransportError;

/// How many times to attempt a send and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per round, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Whether a response with this status may succeed if sent again.
    pub fn should_retry_for_status(code: u16) -> bool {
        matches!(code, 408 | 429 | 500..=599)
    }

    /// Fresh state for a new round; the first attempt is already counted.
    pub fn start(&self) -> RetryState {
        RetryState {
            attempt_count: 1,
            max_attempts: self.max_attempts.max(1),
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            last_status_code: None,
            retry_after: None,
            last_delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_millis(1_000), Duration::from_millis(30_000))
    }
}

/// Per-round retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Number of the attempt currently being made (1-based).
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub last_status_code: Option<u16>,
    /// Server hint attached to the last failure.
    pub retry_after: Option<Duration>,
    /// Delay waited before the current attempt; later delays never go below it.
    pub last_delay: Duration,
}

impl RetryState {
    /// Advances to the next attempt. Returns false once the budget is spent.
    pub fn retry(&mut self) -> bool {
        if self.attempt_count >= self.max_attempts {
            return false;
        }
        self.last_delay = self.delay_before_next_retry();
        self.attempt_count += 1;
        true
    }

    /// Backoff after the current attempt failed: `base * 2^(attempt-1)`,
    /// raised to any `Retry-After` hint and to the previous delay, capped at
    /// `max_delay`.
    pub fn delay_before_next_retry(&self) -> Duration {
        let shift = self.attempt_count.saturating_sub(1).min(20);
        let calculated = self.base_delay.saturating_mul(1_u32 << shift);
        let hinted = self.retry_after.unwrap_or(Duration::ZERO);
        calculated
            .max(hinted)
            .max(self.last_delay)
            .min(self.max_delay)
    }

    /// Remembers what the last failure looked like.
    pub fn record_failure(&mut self, err: &TransportError) {
        match err {
            TransportError::Status { code, retry_after } => {
                self.last_status_code = Some(*code);
                self.retry_after = *retry_after;
            }
            TransportError::Timeout => {
                self.last_status_code = Some(408);
                self.retry_after = None;
            }
            _ => self.retry_after = None,
        }
    }

    /// The error reported when the budget is spent.
    pub fn exhausted(&self) -> SyncError {
        match self.last_status_code {
            Some(status) if self.max_attempts == 1 => SyncError::Retryable { status },
            last_status => SyncError::RetriesExhausted { last_status },
        }
    }
}

/// What the coordinator should do about a failed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Transient: wait and send again.
    Retry,
    /// 401: refresh the token and send again once.
    Reauthenticate,
    /// 400: the batch itself is bad. Terminal.
    Validation(Vec<FieldError>),
    /// 403: the account is suspended. Terminal.
    Suspended,
    /// Anything else. Terminal for this transport.
    Fail(SyncError),
}

/// Classifies a transport failure.
pub fn classify(err: &TransportError) -> Disposition {
    match err {
        TransportError::Status { code: 401, .. } => Disposition::Reauthenticate,
        TransportError::Status { code: 403, .. } => Disposition::Suspended,
        TransportError::Status { code, .. } if RetryPolicy::should_retry_for_status(*code) => {
            Disposition::Retry
        }
        TransportError::Status { code, .. } => {
            Disposition::Fail(SyncError::Protocol(format!("unexpected status {code}")))
        }
        TransportError::Validation(fields) => Disposition::Validation(fields.clone()),
        TransportError::Timeout | TransportError::Network(_) | TransportError::ConnectionClosed => {
            Disposition::Retry
        }
        TransportError::Unavailable(_) => Disposition::Fail(SyncError::TransportUnavailable),
        TransportError::Protocol(msg) => Disposition::Fail(SyncError::Protocol(msg.clone())),
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
