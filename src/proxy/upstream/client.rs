// Authority client
// Project-access validation, OAuth refresh and magic links against the platform

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::proxy::auth::identity::{AuthorityAuth, Identity, Session};
use crate::proxy::config::GatewayConfig;
use crate::proxy::error::UpstreamError;

/// Build an HTTP client with the connection settings shared by every upstream.
pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, String> {
    let mut builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .no_proxy();

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct AuthorityClient {
    http_client: Client,
    project_url: String,
    auth_url: String,
}

impl AuthorityClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, String> {
        Ok(Self {
            http_client: build_http_client(Some(config.validation_timeout()))?,
            project_url: config.project_url(),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Ask the authority whether the credential may access the project.
    ///
    /// Fail-closed: transport errors and non-2xx statuses both mean "no identity".
    pub async fn validate(&self, auth: &AuthorityAuth) -> Option<Identity> {
        match self.check_project_access(auth).await {
            Ok(()) => Some(Identity::authenticated()),
            Err(e) => {
                tracing::debug!(error = %e, "project access check rejected credential");
                None
            }
        }
    }

    async fn check_project_access(&self, auth: &AuthorityAuth) -> Result<(), UpstreamError> {
        let response = auth
            .apply(self.http_client.get(&self.project_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }
        Ok(())
    }

    /// Exchange a refresh token for a fresh pair.
    ///
    /// The authority may omit a rotated refresh token; the old one is kept then.
    pub async fn refresh(&self, refresh_token: &str) -> Option<Session> {
        match self.request_refresh(refresh_token).await {
            Ok(tokens) => {
                let rotated = tokens
                    .refresh_token
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| refresh_token.to_string());
                Some(Session::new(tokens.access_token, rotated))
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                None
            }
        }
    }

    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenResponse, UpstreamError> {
        let url = format!("{}/oauth/token", self.auth_url);
        let response = self
            .http_client
            .post(&url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status(response.status()));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Payload(e.to_string()))?;
        if tokens.access_token.is_empty() {
            return Err(UpstreamError::Payload("empty access_token".to_string()));
        }
        Ok(tokens)
    }

    /// Ask the authority to email a login link. A failure carries the status to relay;
    /// the authority's message only goes to the log.
    pub async fn request_magic_link(&self, email: &str, redirect_uri: &str) -> Result<(), StatusCode> {
        let url = format!("{}/auth/magic-link", self.auth_url);
        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "email": email, "redirect_uri": redirect_uri }))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "magic link request failed");
                StatusCode::BAD_GATEWAY
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %text, "authority refused magic link");
        Err(status)
    }
}
