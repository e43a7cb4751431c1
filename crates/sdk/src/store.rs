// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable storage for the pending outbound queue and sync bookkeeping.
//!
//! [`FileStore`] keeps the queue as JSONL, one notification per line, and
//! fsyncs every append so a queued notification survives a crash. Removing
//! sent notifications rewrites the file through a temp file and rename.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use donky_core::OutboundNotification;
use serde::{Deserialize, Serialize};

const QUEUE_FILE_NAME: &str = "pending.jsonl";
const STATE_FILE_NAME: &str = "state.json";

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence capability consumed by the coordinator.
pub trait SyncStore: Send + Sync {
    /// All queued notifications, oldest first.
    fn load_pending(&self) -> StoreResult<Vec<OutboundNotification>>;

    /// Persists one newly queued notification at the tail.
    fn append_pending(&self, notification: &OutboundNotification) -> StoreResult<()> {
        let mut pending = self.load_pending()?;
        pending.push(notification.clone());
        self.save_pending(&pending)
    }

    /// Replaces the whole queue.
    fn save_pending(&self, pending: &[OutboundNotification]) -> StoreResult<()>;

    fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>>;

    fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pending: Mutex<Vec<OutboundNotification>>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStore for MemoryStore {
    fn load_pending(&self) -> StoreResult<Vec<OutboundNotification>> {
        Ok(self.pending.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn append_pending(&self, notification: &OutboundNotification) -> StoreResult<()> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }

    fn save_pending(&self, pending: &[OutboundNotification]) -> StoreResult<()> {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = pending.to_vec();
        Ok(())
    }

    fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(*self.last_sync.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        *self.last_sync.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncState {
    #[serde(default)]
    last_sync: Option<DateTime<Utc>>,
}

/// Store backed by files in a state directory.
#[derive(Debug)]
pub struct FileStore {
    queue_path: PathBuf,
    state_path: PathBuf,
}

impl FileStore {
    /// Create or open a store in `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let queue_path = dir.join(QUEUE_FILE_NAME);
        // Ensure the file exists (create if not)
        OpenOptions::new().create(true).append(true).open(&queue_path)?;

        Ok(FileStore {
            queue_path,
            state_path: dir.join(STATE_FILE_NAME),
        })
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    fn read_state(&self) -> StoreResult<SyncState> {
        match fs::read_to_string(&self.state_path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn replace_file(path: &Path, contents: &[u8]) -> StoreResult<()> {
        let tmp = path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl SyncStore for FileStore {
    fn load_pending(&self) -> StoreResult<Vec<OutboundNotification>> {
        let file = match File::open(&self.queue_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let reader = BufReader::new(file);
        let mut pending = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            pending.push(serde_json::from_str(&line)?);
        }

        Ok(pending)
    }

    fn append_pending(&self, notification: &OutboundNotification) -> StoreResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.queue_path)?;

        let json = serde_json::to_string(notification)?;
        writeln!(file, "{}", json)?;
        file.sync_all()?;

        Ok(())
    }

    fn save_pending(&self, pending: &[OutboundNotification]) -> StoreResult<()> {
        let mut contents = Vec::new();
        for notification in pending {
            serde_json::to_writer(&mut contents, notification)?;
            contents.push(b'\n');
        }
        Self::replace_file(&self.queue_path, &contents)
    }

    fn last_sync(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.read_state()?.last_sync)
    }

    fn set_last_sync(&self, at: DateTime<Utc>) -> StoreResult<()> {
        let state = SyncState {
            last_sync: Some(at),
        };
        Self::replace_file(&self.state_path, &serde_json::to_vec(&state)?)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
