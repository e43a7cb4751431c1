// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! donky-relay: development backend for the Donky SDK.
//!
//! Speaks the persistent-channel protocol over WebSocket: answers
//! synchronization rounds from an in-memory outbox, records the client
//! notifications it receives, and pushes notifications to every connected
//! client. Failures can be injected per round for testing.

pub mod server;
pub mod state;

pub use server::{run, serve};
pub use state::{InjectedFailure, ServerState, DEFAULT_BATCH_LIMIT};
