//! Gateway authentication middleware
//!
//! Every non-public route resolves the caller before the handler runs. The
//! resolved [`AuthContext`] rides along as a request extension, and any cookie
//! rotation or expiry decided here is appended to the response.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::proxy::auth::{AuthContext, CookiePolicy, Resolution, SessionStore};
use crate::proxy::error::GatewayError;
use crate::proxy::handlers::redirect_found;
use crate::proxy::server::AppState;

pub const API_PREFIX: &str = "/api";

/// Split an optional `/api` prefix off the path: `("/api", "/workforce")`.
pub fn split_api_prefix(path: &str) -> (&'static str, &str) {
    if path == API_PREFIX {
        return (API_PREFIX, "/");
    }
    match path.strip_prefix(API_PREFIX) {
        Some(rest) if rest.starts_with('/') => (API_PREFIX, rest),
        _ => ("", path),
    }
}

/// Routes reachable without a credential.
fn is_public_path(path: &str) -> bool {
    path == "/" || path.starts_with("/auth/") || path.starts_with("/healthcheck")
}

/// Browser pages get sent to the login page instead of a JSON 401.
fn is_page_path(path: &str) -> bool {
    path == "/docs" || path.starts_with("/docs/")
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let (prefix, route) = split_api_prefix(&path);

    if request.method() == axum::http::Method::OPTIONS || is_public_path(route) {
        return next.run(request).await;
    }

    let policy = CookiePolicy::for_request(
        request.headers(),
        request.uri(),
        state.config.access_cookie_http_only,
    );
    let mut session = SessionStore::new(jar, policy);

    match state.resolver.resolve(request.headers(), &mut session).await {
        Resolution::Authenticated(context) => {
            tracing::debug!(path = %path, user = %context.identity.id, "request authenticated");
            request.extensions_mut().insert::<AuthContext>(context);
            let response = next.run(request).await;
            (session.into_jar(), response).into_response()
        }
        Resolution::Rejected if is_page_path(route) => {
            tracing::info!(path = %path, "unauthenticated page request, redirecting to login");
            session.clear();
            let login = format!("{}/auth/login", prefix);
            (session.into_jar(), redirect_found(&login)).into_response()
        }
        Resolution::Rejected => {
            tracing::info!(path = %path, "unauthenticated request rejected");
            (session.into_jar(), GatewayError::Unauthenticated).into_response()
        }
    }
}
