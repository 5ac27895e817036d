// Workforce handlers
// Resolve the manifest id to a running deployment, attach platform context and forward

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    Extension,
};
use bytes::Bytes;
use serde_json::json;

use crate::proxy::auth::AuthContext;
use crate::proxy::error::GatewayError;
use crate::proxy::forwarder::{inject_platform_config, parse_payload, ForwardMode, PlatformContext};
use crate::proxy::server::AppState;

/// POST /workforce/:id
pub async fn handle_run(
    State(state): State<AppState>,
    Path(manifest_id): Path<String>,
    Extension(context): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    forward_call(&state, &manifest_id, &context, &body, ForwardMode::Unary).await
}

/// POST /workforce/:id/stream
pub async fn handle_stream(
    State(state): State<AppState>,
    Path(manifest_id): Path<String>,
    Extension(context): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, GatewayError> {
    forward_call(&state, &manifest_id, &context, &body, ForwardMode::Stream).await
}

async fn forward_call(
    state: &AppState,
    manifest_id: &str,
    context: &AuthContext,
    body: &[u8],
    mode: ForwardMode,
) -> Result<Response, GatewayError> {
    let mut payload = parse_payload(body)?;

    let record = state
        .deployments
        .resolve(manifest_id, &context.authority)
        .await
        .ok_or_else(|| GatewayError::ServiceUnavailable {
            manifest_id: manifest_id.to_string(),
        })?;

    if state.deployments.injects_platform_config() {
        inject_platform_config(
            &mut payload,
            PlatformContext {
                host: state.config.api_host.as_deref(),
                token: context.forward_token.as_deref(),
                org_id: &state.config.org_id,
                app_id: record.target_id.as_deref(),
            },
        );
    }

    state.forwarder.forward(&record, &payload, mode).await
}

/// GET /workforce
pub async fn list_workforce(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, GatewayError> {
    let deployments = state
        .deployments
        .list(&context.authority)
        .await
        .map_err(|e| {
            tracing::warn!(resolver = state.deployments.name(), error = %e, "listing deployments failed");
            GatewayError::UpstreamFailure(e.to_string())
        })?;

    Ok(Json(json!({
        "resolution": state.deployments.name(),
        "deployments": deployments,
    }))
    .into_response())
}
