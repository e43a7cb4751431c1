// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SDK configuration.
//!
//! Configuration is read from a TOML file (default
//! `~/.config/donky/config.toml`, overridable with `DONKY_CONFIG`):
//! - `rest_base_url` / `channel_url`: backend endpoints
//! - `api_key`: sent with every request and used to obtain tokens
//! - `[retry]` and `[reconnect]`: backoff tuning
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::ConnectionConfig;
use crate::env;
use crate::lifecycle::{LifecycleConfig, DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE};
use crate::retry::RetryPolicy;

const APP_DIR_NAME: &str = "donky";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("no state directory\n  hint: set DONKY_STATE_DIR or state_dir in the config file")]
    NoStateDir,
}

/// Top-level SDK configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Base URL of the REST API.
    pub rest_base_url: String,
    /// WebSocket URL of the persistent channel.
    pub channel_url: String,
    pub api_key: String,
    /// Never use the persistent channel for synchronization.
    pub rest_only: bool,
    /// Periodic re-sync interval while the app is foregrounded.
    pub max_minutes_without_exchange: u64,
    /// How long a pause may last before the app counts as closed.
    pub background_grace_ms: u64,
    /// Per-request timeout for REST calls and channel requests.
    pub request_timeout_secs: u64,
    /// Where the pending queue is kept. Defaults to the platform state dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub retry: RetryConfig,
    pub reconnect: ReconnectConfig,
}

/// Retry tuning for synchronization rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per round, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

/// Reconnect tuning for the persistent channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Attempts per connect cycle (0 = unlimited).
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_secs: u64,
    /// Keepalive ping interval in seconds (0 = disabled).
    pub heartbeat_interval_secs: u64,
}

impl Default for SdkConfig {
    fn default() -> Self {
        SdkConfig {
            rest_base_url: "http://localhost:7891".to_string(),
            channel_url: "ws://localhost:7890".to_string(),
            api_key: String::new(),
            rest_only: false,
            max_minutes_without_exchange: DEFAULT_MAX_MINUTES_WITHOUT_EXCHANGE,
            background_grace_ms: 5_000,
            request_timeout_secs: 30,
            state_dir: None,
            retry: RetryConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_secs: 30,
            heartbeat_interval_secs: 30,
        }
    }
}

impl SdkConfig {
    /// Loads and validates configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SdkConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default location if it exists, else
    /// the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(SdkConfig::default()),
        }
    }

    /// Writes the configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rest_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("rest_base_url is empty".into()));
        }
        if !(self.rest_base_url.starts_with("http://") || self.rest_base_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "rest_base_url '{}' must start with http:// or https://",
                self.rest_base_url
            )));
        }
        if self.channel_url.trim().is_empty() {
            return Err(ConfigError::Invalid("channel_url is empty".into()));
        }
        if !(self.channel_url.starts_with("ws://") || self.channel_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "channel_url '{}' must start with ws:// or wss://",
                self.channel_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.channel_url.clone(),
            max_retries: self.reconnect.max_retries,
            max_delay_secs: self.reconnect.max_delay_secs,
            initial_delay_ms: self.reconnect.initial_delay_ms,
            request_timeout: self.request_timeout(),
            heartbeat_interval: Duration::from_secs(self.reconnect.heartbeat_interval_secs),
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            grace: Duration::from_millis(self.background_grace_ms),
            max_minutes_without_exchange: self.max_minutes_without_exchange,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Directory holding the pending queue and sync state.
    ///
    /// Resolution order: `state_dir` from the file, `DONKY_STATE_DIR`,
    /// `$XDG_STATE_HOME/donky`, then the platform state or data dir.
    pub fn resolve_state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = env::state_dir() {
            return Ok(dir);
        }
        if let Some(xdg) = env::xdg_state_home() {
            return Ok(xdg.join(APP_DIR_NAME));
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoStateDir)
    }
}

/// Default config file location: `DONKY_CONFIG`, else the platform config dir.
pub fn default_config_path() -> Option<PathBuf> {
    env::config_path()
        .or_else(|| dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
