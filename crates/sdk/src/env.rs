// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access.
//!
//! All runtime environment variables read by the SDK binary are defined here
//! with typed accessor functions. The variable name constants are generated
//! by `build.rs` and live in the [`vars`] submodule.

use std::path::PathBuf;

/// Generated environment variable name constants.
pub mod vars {
    include!(concat!(env!("OUT_DIR"), "/env_vars.rs"));
}

/// Returns the value of `DONKY_CONFIG` if set.
pub fn config_path() -> Option<PathBuf> {
    std::env::var(vars::DONKY_CONFIG).ok().map(PathBuf::from)
}

/// Returns the value of `DONKY_STATE_DIR` if set.
pub fn state_dir() -> Option<PathBuf> {
    std::env::var(vars::DONKY_STATE_DIR).ok().map(PathBuf::from)
}

/// Returns the log filter directive from `DONKY_LOG` if set and non-empty.
pub fn log_filter() -> Option<String> {
    std::env::var(vars::DONKY_LOG)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Returns the value of `XDG_STATE_HOME` if set.
pub fn xdg_state_home() -> Option<PathBuf> {
    std::env::var(vars::XDG_STATE_HOME).ok().map(PathBuf::from)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
