// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Where completion callbacks run.
//!
//! The coordinator never invokes a caller's callback while holding its
//! locks. It hands a job to a [`CallbackExecutor`], which either runs it
//! right away ([`InlineExecutor`]) or queues it for the host's main thread
//! ([`QueuedExecutor`] + [`MainThreadQueue`]).

use tokio::sync::mpsc;

/// A unit of callback work.
pub type Job = Box<dyn FnOnce() + Send>;

pub trait CallbackExecutor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs jobs on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl CallbackExecutor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Queues jobs for a host thread to drain.
#[derive(Debug, Clone)]
pub struct QueuedExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

/// Receiving end of a [`QueuedExecutor`], owned by the host's main thread.
pub struct MainThreadQueue {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl QueuedExecutor {
    pub fn new() -> (Self, MainThreadQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (QueuedExecutor { tx }, MainThreadQueue { rx })
    }
}

impl CallbackExecutor for QueuedExecutor {
    fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("main thread queue dropped, discarding callback");
        }
    }
}

impl MainThreadQueue {
    /// Runs every job queued so far. Returns how many ran.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Waits for the next job and runs it. Returns false once every
    /// executor handle is gone.
    pub async fn run_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
