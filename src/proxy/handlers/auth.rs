//! Session endpoints: OAuth redirect, token handoff, refresh, magic links, logout.
//!
//! These routes are public; each one manages the session cookies itself.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{parse_json_body, redirect_found};
use crate::proxy::auth::{
    request_origin, AuthorityAuth, CookiePolicy, Resolution, Session, SessionStore,
};
use crate::proxy::error::GatewayError;
use crate::proxy::server::AppState;

fn session_store(state: &AppState, headers: &HeaderMap, uri: &Uri, jar: CookieJar) -> SessionStore {
    let policy = CookiePolicy::for_request(headers, uri, state.config.access_cookie_http_only);
    SessionStore::new(jar, policy)
}

fn callback_url(headers: &HeaderMap, uri: &Uri) -> String {
    format!("{}/auth/callback", request_origin(headers, uri))
}

/// `<auth_url>/oauth/authorize?provider=..&redirect_uri=..`
fn authorize_url(auth_url: &str, provider: &str, redirect_uri: &str) -> Result<Url, GatewayError> {
    Url::parse_with_params(
        &format!("{}/oauth/authorize", auth_url),
        &[("provider", provider), ("redirect_uri", redirect_uri)],
    )
    .map_err(|e| {
        tracing::error!(error = %e, "auth_url does not form a valid authorize URL");
        GatewayError::UpstreamFailure(e.to_string())
    })
}

/// GET /auth/:provider
pub async fn oauth_redirect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    if !state.config.is_known_provider(&provider) {
        return Err(GatewayError::InvalidInput("Invalid provider".to_string()));
    }

    let target = authorize_url(
        state.authority.auth_url(),
        &provider,
        &callback_url(&headers, &uri),
    )?;
    tracing::info!(provider = %provider, "redirecting to OAuth provider");
    Ok(redirect_found(target.as_str()))
}

#[derive(Deserialize)]
pub struct SetTokenRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// POST /auth/set-token
pub async fn set_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<serde_json::Value>), GatewayError> {
    let req: SetTokenRequest = parse_json_body(&body)?;
    if req.access_token.is_empty() {
        return Err(GatewayError::InvalidInput("access_token is required".to_string()));
    }

    let identity = state
        .authority
        .validate(&AuthorityAuth::Bearer(req.access_token.clone()))
        .await
        .ok_or(GatewayError::Unauthenticated)?;

    let mut session = session_store(&state, &headers, &uri, jar);
    session.set(&Session::new(req.access_token, req.refresh_token.unwrap_or_default()));
    tracing::info!("session established from callback tokens");

    Ok((session.into_jar(), Json(json!({ "success": true, "user": identity }))))
}

#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let req: RefreshRequest = parse_json_body(&body)?;
    let mut session = session_store(&state, &headers, &uri, jar);

    let refresh_token = req
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| session.refresh_token())
        .ok_or_else(|| GatewayError::InvalidInput("refresh_token is required".to_string()))?;

    match state.authority.refresh(&refresh_token).await {
        Some(fresh) => {
            session.set(&fresh);
            let body = Json(json!({ "success": true, "refresh_token": fresh.refresh_token }));
            Ok((session.into_jar(), body).into_response())
        }
        None => {
            session.clear();
            Ok((session.into_jar(), GatewayError::Unauthenticated).into_response())
        }
    }
}

#[derive(Deserialize)]
pub struct MagicLinkRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /auth/magic-link
pub async fn magic_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let req: MagicLinkRequest = parse_json_body(&body)?;
    let email = req.email.trim();
    if email.is_empty() {
        return Err(GatewayError::InvalidInput("email is required".to_string()));
    }

    match state
        .authority
        .request_magic_link(email, &callback_url(&headers, &uri))
        .await
    {
        Ok(()) => Ok(Json(json!({
            "success": true,
            "message": "Check your email for the login link"
        }))
        .into_response()),
        Err(status) => {
            let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
            Ok((status, Json(json!({ "error": "Failed to send magic link" }))).into_response())
        }
    }
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    let mut session = session_store(&state, &headers, &uri, jar);
    session.clear();
    (session.into_jar(), redirect_found("/auth/login")).into_response()
}

/// GET /auth/me
pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    jar: CookieJar,
) -> Response {
    let mut session = session_store(&state, &headers, &uri, jar);
    match state.resolver.resolve(&headers, &mut session).await {
        Resolution::Authenticated(context) => (
            session.into_jar(),
            Json(json!({ "authenticated": true, "user": context.identity })),
        )
            .into_response(),
        Resolution::Rejected => (session.into_jar(), GatewayError::Unauthenticated).into_response(),
    }
}
