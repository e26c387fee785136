//! HTTP client for an Identity Toolkit style authentication endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthMode, CredentialExchange};
use crate::error::{SessionError, SessionResult};

/// Default base URL for the accounts endpoints
pub const DEFAULT_AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile networks while failing fast enough for good UX.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "idToken")]
    id_token: String,
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityToolkitClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl IdentityToolkitClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: DEFAULT_AUTH_BASE_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Point the client at a different endpoint, sharing the connection pool.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
        }
    }

    fn endpoint_url(&self, mode: AuthMode) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, mode.endpoint(), self.api_key)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> SessionResult<reqwest::Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SessionError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl CredentialExchange for IdentityToolkitClient {
    async fn exchange(&self, mode: AuthMode, email: &str, password: &str) -> SessionResult<String> {
        debug!(mode = mode.endpoint(), "Sending credential exchange request");

        let response = self
            .client
            .post(self.endpoint_url(mode))
            .json(&AuthRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await?;

        let response = match Self::check_response(response).await {
            Ok(response) => response,
            Err(e) => {
                warn!(mode = mode.endpoint(), error = %e, "Credential exchange rejected");
                return Err(e);
            }
        };

        let auth: AuthResponse = response.json().await.map_err(|e| {
            SessionError::AuthRejected(format!("Invalid response from identity provider: {}", e))
        })?;

        if auth.id_token.is_empty() {
            return Err(SessionError::AuthRejected(
                "Identity provider returned an empty token".to_string(),
            ));
        }

        Ok(auth.id_token)
    }
}
