use chrono::{DateTime, Utc};
use serde::Serialize;

use super::credentials::Credential;

/// Subject id the authority's project-access check vouches for.
pub const AUTHENTICATED_SUBJECT: &str = "timbal-authenticated";

/// Minimal authenticated subject. Scopes and roles stay with the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub id: String,
}

impl Identity {
    pub fn authenticated() -> Self {
        Self {
            id: AUTHENTICATED_SUBJECT.to_string(),
        }
    }
}

/// How a credential is presented to the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityAuth {
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// `x-api-key: <key>`
    ApiKey(String),
}

impl From<&Credential> for AuthorityAuth {
    fn from(credential: &Credential) -> Self {
        match credential {
            Credential::ApiKey(key) => Self::ApiKey(key.clone()),
            other => Self::Bearer(other.value().to_string()),
        }
    }
}

impl AuthorityAuth {
    pub fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::Bearer(token) => request.bearer_auth(token),
            Self::ApiKey(key) => request.header(super::credentials::API_KEY_HEADER, key),
        }
    }
}

/// Settled identity for one request, stored as a request extension.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub identity: Identity,
    /// Credential used for authority-side calls such as deployment discovery
    pub authority: AuthorityAuth,
    /// Token injected into backend payloads; `None` for API keys
    pub forward_token: Option<String>,
}

/// Access/refresh pair held by the client as cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at: Utc::now(),
        }
    }
}
