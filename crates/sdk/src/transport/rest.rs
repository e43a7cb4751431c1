// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! REST transport.
//!
//! One POST per synchronization round. Status codes are surfaced to the
//! retry layer untouched; the transport itself never retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use donky_core::{FieldError, ServerNotification, SyncRequest, SyncResponse};
use reqwest::header::RETRY_AFTER;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Transport, TransportError, TransportFuture, TransportKind, TransportResult};
use crate::auth::Authenticator;

const SYNCHRONISE_PATH: &str = "api/notification/synchronise";
const NOTIFICATION_PATH: &str = "api/notification";

/// Synchronization over HTTP.
pub struct RestTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    auth: Arc<dyn Authenticator>,
}

impl RestTransport {
    /// Create a REST transport against `base_url`.
    pub fn new(
        base_url: &str,
        api_key: &str,
        auth: Arc<dyn Authenticator>,
        timeout: Duration,
    ) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(RestTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            auth,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header("ApiKey", &self.api_key);
        match self.auth.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn read_body(response: reqwest::Response) -> TransportResult<String> {
        let status = response.status();
        if status.is_success() {
            return response.text().await.map_err(map_reqwest_error);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "backend returned error status");
        Err(error_for_status(status.as_u16(), retry_after, &body))
    }
}

impl Transport for RestTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Rest
    }

    fn send<'a>(&'a self, request: &'a SyncRequest) -> TransportFuture<'a, SyncResponse> {
        Box::pin(async move {
            let url = self.url(SYNCHRONISE_PATH);
            debug!(
                url = %url,
                outbound = request.client_notifications.len(),
                "sending synchronise request"
            );
            let response = self
                .authorize(self.client.post(&url))
                .json(request)
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let body = Self::read_body(response).await?;
            SyncResponse::decode(&body).map_err(|e| TransportError::Protocol(e.to_string()))
        })
    }

    fn fetch<'a>(&'a self, notification_id: &'a str) -> TransportFuture<'a, ServerNotification> {
        Box::pin(async move {
            let url = self.url(&format!("{NOTIFICATION_PATH}/{notification_id}"));
            debug!(url = %url, "fetching server notification");
            let response = self
                .authorize(self.client.get(&url))
                .send()
                .await
                .map_err(map_reqwest_error)?;
            let body = Self::read_body(response).await?;
            let value: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| TransportError::Protocol(e.to_string()))?;
            ServerNotification::decode(value).map_err(|e| TransportError::Protocol(e.to_string()))
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Protocol(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationBody {
    #[serde(default)]
    validation_errors: Vec<FieldError>,
}

/// Maps a non-success status and its body to a transport error.
pub(crate) fn error_for_status(
    code: u16,
    retry_after: Option<Duration>,
    body: &str,
) -> TransportError {
    if code == 400 {
        return TransportError::Validation(parse_field_errors(body));
    }
    TransportError::Status { code, retry_after }
}

/// Reads field errors from a 400 body.
///
/// Accepts `{"validationErrors": [...]}` or a bare array; anything else
/// yields no field errors.
pub(crate) fn parse_field_errors(body: &str) -> Vec<FieldError> {
    if let Ok(parsed) = serde_json::from_str::<ValidationBody>(body) {
        return parsed.validation_errors;
    }
    serde_json::from_str::<Vec<FieldError>>(body).unwrap_or_default()
}

/// Parses a `Retry-After` header value (delta-seconds or HTTP-date).
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc).signed_duration_since(now);
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
