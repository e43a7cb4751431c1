// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    missing_field = { Error::MissingField { context: "server notification", field: "id" }, "'id'" },
    invalid_category = { Error::InvalidCategory("bogus".into()), "bogus" },
    invalid_frame = { Error::InvalidFrame { context: "server frame", reason: "empty".into() }, "empty" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_category_display_has_hint() {
    let msg = Error::InvalidCategory("x".into()).to_string();
    assert!(msg.contains("hint"));
    assert!(msg.contains("donky, custom"));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}
