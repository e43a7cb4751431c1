// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! donky-core: Shared data model for the Donky notification SDK
//!
//! This crate provides the notification types, the persistent-channel
//! protocol frames, and the clock abstraction used by both the `donky` SDK
//! and the `donky-relay` development backend.

pub mod clock;
pub mod error;
pub mod notification;
pub mod protocol;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use notification::{
    AcknowledgementResult, FieldError, NotificationCategory, OutboundNotification,
    ServerNotification, ACKNOWLEDGEMENT_TYPE, CUSTOM_TYPE, MESSAGE_DELETED_TYPE,
    MESSAGE_READ_TYPE,
};
pub use protocol::{ClientFrame, ServerFrame, SyncRequest, SyncResponse};
