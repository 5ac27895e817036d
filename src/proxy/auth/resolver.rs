//! Per-request identity resolution.
//!
//! Candidates are walked top-down with early return:
//! header credentials are exclusive, the session cookie falls back to a
//! refresh, and any cookie-sourced rejection expires both cookies.

use std::sync::Arc;

use axum::http::HeaderMap;

use super::credentials::{extract_credentials, Credential};
use super::identity::{AuthContext, AuthorityAuth};
use super::session::SessionStore;
use crate::proxy::upstream::AuthorityClient;

#[derive(Debug, Clone)]
pub enum Resolution {
    Authenticated(AuthContext),
    Rejected,
}

impl Resolution {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

pub struct AuthResolver {
    authority: Arc<AuthorityClient>,
}

impl AuthResolver {
    pub fn new(authority: Arc<AuthorityClient>) -> Self {
        Self { authority }
    }

    pub async fn resolve(&self, headers: &HeaderMap, session: &mut SessionStore) -> Resolution {
        let candidates = extract_credentials(headers, session.jar());
        if candidates.is_empty() {
            tracing::debug!("no credential presented");
            return Resolution::Rejected;
        }

        for credential in &candidates {
            let outcome = match credential {
                Credential::RefreshCookie(refresh_token) => {
                    self.refresh_session(refresh_token, session).await
                }
                other => self.validate(other).await,
            };

            if let Some(context) = outcome {
                tracing::debug!(source = credential.kind(), "credential accepted");
                return Resolution::Authenticated(context);
            }

            tracing::debug!(source = credential.kind(), "credential rejected");
            if credential.is_header() {
                return Resolution::Rejected;
            }
        }

        // Only cookie candidates reach this point; drop them so the next request starts clean.
        session.clear();
        Resolution::Rejected
    }

    async fn validate(&self, credential: &Credential) -> Option<AuthContext> {
        if credential.value().is_empty() {
            return None;
        }
        let authority = AuthorityAuth::from(credential);
        let identity = self.authority.validate(&authority).await?;
        let forward_token = match credential {
            Credential::ApiKey(_) => None,
            other => Some(other.value().to_string()),
        };

        Some(AuthContext {
            identity,
            authority,
            forward_token,
        })
    }

    /// Refresh, rotate the cookies, then validate the new access token.
    async fn refresh_session(
        &self,
        refresh_token: &str,
        session: &mut SessionStore,
    ) -> Option<AuthContext> {
        let fresh = self.authority.refresh(refresh_token).await?;
        session.set(&fresh);
        tracing::info!("session refreshed, cookies rotated");

        let access = Credential::SessionCookie(fresh.access_token);
        self.validate(&access).await
    }
}
