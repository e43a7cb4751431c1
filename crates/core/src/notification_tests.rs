// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use chrono::TimeZone;
use serde_json::json;
use yare::parameterized;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap()
}

#[parameterized(
    donky = { "donky", NotificationCategory::Donky },
    donky_pascal = { "Donky", NotificationCategory::Donky },
    custom_upper = { "CUSTOM", NotificationCategory::Custom },
)]
fn category_from_str(input: &str, expected: NotificationCategory) {
    assert_eq!(input.parse::<NotificationCategory>().unwrap(), expected);
}

#[test]
fn category_from_str_rejects_unknown() {
    let err = "system".parse::<NotificationCategory>().unwrap_err();
    assert!(matches!(err, Error::InvalidCategory(_)));
}

#[test]
fn outbound_ids_are_unique() {
    let a = OutboundNotification::new("Test", Map::new(), at(0));
    let b = OutboundNotification::new("Test", Map::new(), at(0));
    assert_ne!(a.id, b.id);
}

#[test]
fn outbound_serializes_camel_case_with_type_key() {
    let n = OutboundNotification::message_read("msg-1", at(1_000));
    let value = serde_json::to_value(&n).unwrap();
    assert_eq!(value["type"], "MessageRead");
    assert_eq!(value["payload"]["messageId"], "msg-1");
    assert!(value.get("createdAt").is_some());
}

#[test]
fn acknowledgement_references_server_notification() {
    let server = ServerNotification::donky("srv-1", "SyncMessageRead", Map::new(), at(0));
    let ack = OutboundNotification::acknowledgement(
        &server,
        AcknowledgementResult::Delivered,
        at(5_000),
    );

    assert_eq!(ack.notification_type, ACKNOWLEDGEMENT_TYPE);
    assert_eq!(ack.payload["serverNotificationId"], "srv-1");
    assert_eq!(ack.payload["result"], "Delivered");
    assert_eq!(ack.payload["type"], "SyncMessageRead");
    assert!(ack.payload.get("customNotificationType").is_none());
}

#[test]
fn acknowledgement_of_custom_includes_custom_type() {
    let server = ServerNotification::custom("srv-2", "chatMessage", Map::new(), at(0));
    let ack = OutboundNotification::acknowledgement(
        &server,
        AcknowledgementResult::DeliveredNoSubscription,
        at(0),
    );
    assert_eq!(ack.payload["customNotificationType"], "chatMessage");
    assert_eq!(ack.payload["result"], "DeliveredNoSubscription");
}

#[test]
fn custom_outbound_wraps_data() {
    let n = OutboundNotification::custom("ping", json!({"n": 1}), at(0));
    assert_eq!(n.notification_type, CUSTOM_TYPE);
    assert_eq!(n.payload["customType"], "ping");
    assert_eq!(n.payload["data"]["n"], 1);
}

#[test]
fn dispatch_key_for_donky_is_type() {
    let n = ServerNotification::donky("1", "SyncMessageDeleted", Map::new(), at(0));
    assert_eq!(n.dispatch_key(), "SyncMessageDeleted");
}

#[test]
fn dispatch_key_for_custom_is_custom_type() {
    let n = ServerNotification::custom("1", "orderShipped", Map::new(), at(0));
    assert_eq!(n.dispatch_key(), "orderShipped");
}

#[test]
fn decode_valid_notification() {
    let value = json!({
        "id": "abc",
        "type": "Custom",
        "category": "Custom",
        "createdAt": "2026-01-01T00:00:00Z",
        "data": {"customType": "score", "points": 3}
    });
    let n = ServerNotification::decode(value).unwrap();
    assert_eq!(n.id, "abc");
    assert_eq!(n.dispatch_key(), "score");
}

#[test]
fn decode_defaults_missing_data_to_empty() {
    let value = json!({
        "id": "abc",
        "type": "NewDevice",
        "category": "Donky",
        "createdAt": "2026-01-01T00:00:00Z"
    });
    let n = ServerNotification::decode(value).unwrap();
    assert!(n.data.is_empty());
}

#[test]
fn decode_rejects_missing_id() {
    let value = json!({
        "type": "NewDevice",
        "category": "Donky",
        "createdAt": "2026-01-01T00:00:00Z"
    });
    assert!(matches!(
        ServerNotification::decode(value).unwrap_err(),
        Error::Json(_)
    ));
}

#[test]
fn decode_rejects_blank_id() {
    let value = json!({
        "id": "  ",
        "type": "NewDevice",
        "category": "Donky",
        "createdAt": "2026-01-01T00:00:00Z"
    });
    assert!(matches!(
        ServerNotification::decode(value).unwrap_err(),
        Error::MissingField { field: "id", .. }
    ));
}

#[test]
fn decode_rejects_custom_without_custom_type() {
    let value = json!({
        "id": "abc",
        "type": "Custom",
        "category": "Custom",
        "createdAt": "2026-01-01T00:00:00Z",
        "data": {}
    });
    assert!(matches!(
        ServerNotification::decode(value).unwrap_err(),
        Error::MissingField { field: "data.customType", .. }
    ));
}

#[test]
fn field_error_display() {
    let err = FieldError {
        property: "messageId".into(),
        details: "required".into(),
    };
    assert_eq!(err.to_string(), "messageId: required");
}

#[test]
fn outbound_types_match_root_constants() {
    let read = OutboundNotification::message_read("m1", at(0));
    let deleted = OutboundNotification::message_deleted("m1", at(0));
    let custom = OutboundNotification::custom("score", json!({}), at(0));

    assert_eq!(read.notification_type, crate::MESSAGE_READ_TYPE);
    assert_eq!(deleted.notification_type, crate::MESSAGE_DELETED_TYPE);
    assert_eq!(custom.notification_type, crate::CUSTOM_TYPE);
    assert_eq!(crate::ACKNOWLEDGEMENT_TYPE, "Acknowledgement");
}
