// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client and server notification types.
//!
//! An [`OutboundNotification`] is something the device tells the backend
//! ("message read", "acknowledged"). A [`ServerNotification`] is something
//! the backend tells the device. Both carry an opaque JSON payload keyed by
//! their type.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Outbound type used for acknowledgements of server notifications.
pub const ACKNOWLEDGEMENT_TYPE: &str = "Acknowledgement";
/// Outbound type reporting that a rich message was read.
pub const MESSAGE_READ_TYPE: &str = "MessageRead";
/// Outbound type reporting that a rich message was deleted.
pub const MESSAGE_DELETED_TYPE: &str = "MessageDeleted";
/// Outbound and inbound type wrapping an application-defined notification.
pub const CUSTOM_TYPE: &str = "Custom";

/// Category of a server notification.
///
/// Donky notifications are platform-defined; Custom notifications carry an
/// application-defined type in `data.customType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationCategory {
    Donky,
    Custom,
}

impl NotificationCategory {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Donky => "Donky",
            NotificationCategory::Custom => "Custom",
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "donky" => Ok(NotificationCategory::Donky),
            "custom" => Ok(NotificationCategory::Custom),
            _ => Err(Error::InvalidCategory(s.to_string())),
        }
    }
}

/// Outcome reported back to the backend when acknowledging a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcknowledgementResult {
    Delivered,
    DeliveredNoSubscription,
}

/// A field-level validation failure reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub property: String,
    pub details: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.property, self.details)
    }
}

/// A unit of information queued on the device for delivery to the backend.
///
/// Immutable once queued. Removed from the pending queue only after a
/// synchronization round that included it has succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl OutboundNotification {
    /// Creates a notification with a freshly generated id.
    pub fn new(
        notification_type: impl Into<String>,
        payload: Map<String, Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        OutboundNotification {
            id: uuid::Uuid::new_v4().to_string(),
            notification_type: notification_type.into(),
            payload,
            created_at,
        }
    }

    /// Builds the acknowledgement for a delivered server notification.
    pub fn acknowledgement(
        server: &ServerNotification,
        result: AcknowledgementResult,
        sent_at: DateTime<Utc>,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert("serverNotificationId".into(), Value::from(server.id.clone()));
        payload.insert(
            "result".into(),
            serde_json::to_value(result).unwrap_or(Value::Null),
        );
        payload.insert("sentTime".into(), Value::from(sent_at.to_rfc3339()));
        payload.insert(
            "type".into(),
            Value::from(server.notification_type.clone()),
        );
        if server.category == NotificationCategory::Custom {
            payload.insert(
                "customNotificationType".into(),
                Value::from(server.dispatch_key().to_string()),
            );
        }
        OutboundNotification::new(ACKNOWLEDGEMENT_TYPE, payload, sent_at)
    }

    /// Reports that a message was read on this device.
    pub fn message_read(message_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::message_event(MESSAGE_READ_TYPE, message_id.into(), at)
    }

    /// Reports that a message was deleted on this device.
    pub fn message_deleted(message_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self::message_event(MESSAGE_DELETED_TYPE, message_id.into(), at)
    }

    /// Wraps an application-defined notification.
    pub fn custom(custom_type: impl Into<String>, data: Value, at: DateTime<Utc>) -> Self {
        let mut payload = Map::new();
        payload.insert("customType".into(), Value::from(custom_type.into()));
        payload.insert("data".into(), data);
        OutboundNotification::new(CUSTOM_TYPE, payload, at)
    }

    fn message_event(notification_type: &str, message_id: String, at: DateTime<Utc>) -> Self {
        let mut payload = Map::new();
        payload.insert("messageId".into(), Value::from(message_id));
        OutboundNotification::new(notification_type, payload, at)
    }
}

/// A unit of information produced by the backend for this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub category: NotificationCategory,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ServerNotification {
    /// Creates a Donky-category notification.
    pub fn donky(
        id: impl Into<String>,
        notification_type: impl Into<String>,
        data: Map<String, Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        ServerNotification {
            id: id.into(),
            notification_type: notification_type.into(),
            category: NotificationCategory::Donky,
            created_at,
            data,
        }
    }

    /// Creates a Custom-category notification with the given custom type.
    pub fn custom(
        id: impl Into<String>,
        custom_type: impl Into<String>,
        mut data: Map<String, Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        data.insert("customType".into(), Value::from(custom_type.into()));
        ServerNotification {
            id: id.into(),
            notification_type: CUSTOM_TYPE.to_string(),
            category: NotificationCategory::Custom,
            created_at,
            data,
        }
    }

    /// The type subscriptions are matched against.
    ///
    /// For Custom notifications this is the application-defined
    /// `data.customType`; for Donky notifications it is the notification type.
    pub fn dispatch_key(&self) -> &str {
        match self.category {
            NotificationCategory::Donky => self.notification_type.as_str(),
            NotificationCategory::Custom => self
                .data
                .get("customType")
                .and_then(Value::as_str)
                .unwrap_or(self.notification_type.as_str()),
        }
    }

    /// Checks the fields serde cannot enforce on its own.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::MissingField {
                context: "server notification",
                field: "id",
            });
        }
        if self.notification_type.trim().is_empty() {
            return Err(Error::MissingField {
                context: "server notification",
                field: "type",
            });
        }
        if self.category == NotificationCategory::Custom
            && !self.data.get("customType").is_some_and(Value::is_string)
        {
            return Err(Error::MissingField {
                context: "custom server notification",
                field: "data.customType",
            });
        }
        Ok(())
    }

    /// Decodes and validates a notification from a JSON value.
    pub fn decode(value: Value) -> Result<Self> {
        let notification: ServerNotification = serde_json::from_value(value)?;
        notification.validate()?;
        Ok(notification)
    }
}

#[cfg(test)]
#[path = "notification_tests.rs"]
mod tests;
