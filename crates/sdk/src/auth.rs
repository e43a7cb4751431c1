// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Authentication capability.
//!
//! The SDK never owns registration. It asks an [`Authenticator`] for the
//! current bearer token and, when the backend answers 401, asks it to
//! obtain a fresh one exactly once before retrying.

use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Error type for authentication operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication rejected with status {0}")]
    Rejected(u16),

    #[error("authentication request failed: {0}")]
    Network(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("re-authentication is not supported by this authenticator")]
    Unsupported,
}

/// Boxed future returned by [`Authenticator::reauthenticate`].
pub type AuthFuture<'a> = Pin<Box<dyn Future<Output = Result<(), AuthError>> + Send + 'a>>;

/// Source of the bearer token sent with every backend request.
pub trait Authenticator: Send + Sync {
    /// The current token, if one has been obtained.
    fn token(&self) -> Option<String>;

    /// Obtains a fresh token, replacing the current one.
    fn reauthenticate(&self) -> AuthFuture<'_>;
}

/// Authenticator holding a fixed token supplied by the host.
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    token: RwLock<Option<String>>,
}

impl StaticAuthenticator {
    pub fn new(token: Option<String>) -> Self {
        StaticAuthenticator {
            token: RwLock::new(token),
        }
    }

    /// Replaces the token. Persistent links opened with the old token
    /// become stale.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }
}

impl Authenticator for StaticAuthenticator {
    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reauthenticate(&self) -> AuthFuture<'_> {
        Box::pin(async { Err(AuthError::Unsupported) })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
}

/// Authenticator that exchanges the API key for a token over REST.
#[derive(Debug)]
pub struct RestAuthenticator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    token: RwLock<Option<String>>,
}

impl RestAuthenticator {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(RestAuthenticator {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            token: RwLock::new(None),
        })
    }

    async fn fetch_token(&self) -> Result<String, AuthError> {
        let url = format!("{}/api/authentication/gettoken", self.base_url);
        debug!(url = %url, "requesting access token");

        let response = self
            .client
            .post(&url)
            .header("ApiKey", &self.api_key)
            .json(&TokenRequest {
                api_key: &self.api_key,
            })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "token request rejected");
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        parse_token_response(&body)
    }
}

impl Authenticator for RestAuthenticator {
    fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reauthenticate(&self) -> AuthFuture<'_> {
        Box::pin(async move {
            let token = self.fetch_token().await?;
            *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
            Ok(())
        })
    }
}

/// Extracts the access token from a token endpoint response body.
pub(crate) fn parse_token_response(body: &str) -> Result<String, AuthError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    if response.access_token.trim().is_empty() {
        return Err(AuthError::InvalidResponse(
            "accessToken is empty".to_string(),
        ));
    }
    Ok(response.access_token)
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
