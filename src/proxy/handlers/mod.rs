// Handlers module - API endpoint handlers

pub mod auth;
pub mod status;
pub mod workforce;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;

use crate::proxy::error::GatewayError;

/// Plain `302 Found`. Browsers and the login flow expect it rather than 303/307.
pub fn redirect_found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Decode a JSON request body. Malformed bodies are a 400; the serde detail is only logged.
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "rejected request body");
        GatewayError::InvalidInput("invalid JSON body".to_string())
    })
}
