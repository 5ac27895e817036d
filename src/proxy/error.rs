//! Request outcomes surfaced to callers.
//!
//! Every upstream failure is logged where it happens and downgraded to one of
//! these variants; response bodies never carry upstream detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthenticated,

    #[error("workforce {manifest_id} is not running")]
    ServiceUnavailable { manifest_id: String },

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Unauthorized".to_string(),
            Self::ServiceUnavailable { .. } => "Workforce is not running".to_string(),
            Self::UpstreamFailure(_) => "Bad gateway".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}

/// Failures of outbound calls to the authority, discovery API or backends.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {0}")]
    Status(reqwest::StatusCode),

    #[error("unexpected payload: {0}")]
    Payload(String),
}
