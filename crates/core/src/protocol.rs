// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Synchronization payloads and persistent-channel frames.
//!
//! A synchronization round sends a [`SyncRequest`] (the snapshot of queued
//! client notifications) and receives a [`SyncResponse`] (server
//! notifications for this device). Over REST the two travel as plain JSON
//! bodies; over the persistent channel they are wrapped in frames:
//! - Client sends `synchronise` requests tagged with a request id
//! - Server answers with `synchronise_result` or `failure` carrying the same id
//! - Server may push `push` (inline notifications) or `pending` (id only) at any time

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::notification::{FieldError, OutboundNotification, ServerNotification};

/// Body of a synchronization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Queued client notifications, in enqueue order.
    pub client_notifications: Vec<OutboundNotification>,
    /// True when the round was triggered while the app is not foregrounded.
    #[serde(default)]
    pub is_background: bool,
}

impl SyncRequest {
    /// Creates a request carrying the given snapshot.
    pub fn new(client_notifications: Vec<OutboundNotification>) -> Self {
        SyncRequest {
            client_notifications,
            is_background: false,
        }
    }
}

/// Body of a synchronization response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Server notifications for this device, in delivery order.
    #[serde(default)]
    pub server_notifications: Vec<ServerNotification>,
    /// Set when the backend capped the batch and more are waiting.
    #[serde(default)]
    pub more_notifications_available: bool,
}

impl SyncResponse {
    /// Creates a response with the given notifications.
    pub fn with_notifications(server_notifications: Vec<ServerNotification>) -> Self {
        SyncResponse {
            server_notifications,
            more_notifications_available: false,
        }
    }

    /// Validates every contained notification.
    pub fn validate(&self) -> Result<()> {
        self.server_notifications
            .iter()
            .try_for_each(ServerNotification::validate)
    }

    /// Decodes and validates a response body.
    pub fn decode(text: &str) -> Result<Self> {
        let response: SyncResponse = serde_json::from_str(text)?;
        response.validate()?;
        Ok(response)
    }
}

/// Frames sent from client to server over the persistent channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Run one synchronization round.
    ///
    /// The server answers with a frame carrying the same `request_id`.
    Synchronise { request_id: u64, request: SyncRequest },

    /// Ping message for keepalive.
    Ping {
        /// Client-chosen ID echoed in Pong.
        id: u64,
    },
}

/// Frames sent from server to client over the persistent channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Successful answer to a Synchronise frame.
    SynchroniseResult { request_id: u64, response: SyncResponse },

    /// Failed answer to a Synchronise frame, carrying an HTTP-style status.
    Failure {
        request_id: u64,
        status: u16,
        #[serde(default)]
        message: String,
        #[serde(default)]
        field_errors: Vec<FieldError>,
    },

    /// Unsolicited notifications delivered inline.
    Push {
        notifications: Vec<ServerNotification>,
    },

    /// Unsolicited marker: a notification is waiting and must be fetched by id.
    Pending { notification_id: String },

    /// Pong response to client Ping.
    Pong {
        /// Echoed from the Ping message.
        id: u64,
    },
}

impl ClientFrame {
    /// Creates a Synchronise frame.
    pub fn synchronise(request_id: u64, request: SyncRequest) -> Self {
        ClientFrame::Synchronise { request_id, request }
    }

    /// Creates a Ping frame.
    pub fn ping(id: u64) -> Self {
        ClientFrame::Ping { id }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the frame from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerFrame {
    /// Creates a SynchroniseResult frame.
    pub fn result(request_id: u64, response: SyncResponse) -> Self {
        ServerFrame::SynchroniseResult {
            request_id,
            response,
        }
    }

    /// Creates a Failure frame.
    pub fn failure(request_id: u64, status: u16, message: impl Into<String>) -> Self {
        ServerFrame::Failure {
            request_id,
            status,
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    /// Creates a Push frame.
    pub fn push(notifications: Vec<ServerNotification>) -> Self {
        ServerFrame::Push { notifications }
    }

    /// Creates a Pending frame.
    pub fn pending(notification_id: impl Into<String>) -> Self {
        ServerFrame::Pending {
            notification_id: notification_id.into(),
        }
    }

    /// Creates a Pong frame.
    pub fn pong(id: u64) -> Self {
        ServerFrame::Pong { id }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes and validates a frame received from the server.
    pub fn decode(text: &str) -> Result<Self> {
        let frame: ServerFrame = serde_json::from_str(text)?;
        frame.validate()?;
        Ok(frame)
    }

    fn validate(&self) -> Result<()> {
        match self {
            ServerFrame::SynchroniseResult { response, .. } => response.validate(),
            ServerFrame::Push { notifications } => notifications
                .iter()
                .try_for_each(ServerNotification::validate),
            ServerFrame::Pending { notification_id } if notification_id.trim().is_empty() => {
                Err(Error::InvalidFrame {
                    context: "pending frame",
                    reason: "notification_id is empty".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
