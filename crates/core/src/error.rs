// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for donky-core operations.

use thiserror::Error;

/// All possible errors that can occur while decoding or building core types.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing required field '{field}' in {context}")]
    MissingField {
        context: &'static str,
        field: &'static str,
    },

    #[error("invalid notification category: '{0}'\n  hint: valid categories are: donky, custom")]
    InvalidCategory(String),

    #[error("invalid {context}: {reason}")]
    InvalidFrame {
        context: &'static str,
        reason: String,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for donky-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
