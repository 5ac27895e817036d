use axum::{
    extract::{OriginalUri, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;

use super::redirect_found;
use crate::proxy::auth::AuthContext;
use crate::proxy::middleware::auth::split_api_prefix;
use crate::proxy::server::AppState;

/// GET / → docs page, keeping the `/api` prefix when it was used.
pub async fn root(OriginalUri(uri): OriginalUri) -> Response {
    let (prefix, _) = split_api_prefix(uri.path());
    redirect_found(&format!("{}/docs", prefix))
}

/// GET /healthcheck
pub async fn healthcheck(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
    .into_response()
}

/// GET /verify
pub async fn verify(Extension(context): Extension<AuthContext>) -> Response {
    Json(json!({
        "authenticated": true,
        "user": context.identity,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
    .into_response()
}
