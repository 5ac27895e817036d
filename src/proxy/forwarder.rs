//! Forwards workforce calls to a resolved backend and relays its response.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::proxy::config::GatewayConfig;
use crate::proxy::deployment::DeploymentRecord;
use crate::proxy::error::GatewayError;
use crate::proxy::upstream::build_http_client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// `POST /run`: backend status, headers and body relayed as-is
    Unary,
    /// `POST /stream`: server-sent events, headers forced
    Stream,
}

impl ForwardMode {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Unary => "run",
            Self::Stream => "stream",
        }
    }
}

/// Auth and subject attribution handed to the backend inside the payload.
#[derive(Debug, Clone, Copy)]
pub struct PlatformContext<'a> {
    pub host: Option<&'a str>,
    pub token: Option<&'a str>,
    pub org_id: &'a str,
    pub app_id: Option<&'a str>,
}

impl PlatformContext<'_> {
    fn to_json(self) -> Value {
        json!({
            "host": self.host,
            "auth": {
                "type": "bearer",
                "token": self.token,
            },
            "subject": {
                "org_id": self.org_id,
                "app_id": self.app_id,
            },
        })
    }
}

/// Caller body as a JSON object. An empty body counts as `{}`.
pub fn parse_payload(body: &[u8]) -> Result<Value, GatewayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err(GatewayError::InvalidInput("request body must be a JSON object".to_string())),
        Err(e) => {
            tracing::debug!(error = %e, "rejected workforce payload");
            Err(GatewayError::InvalidInput("invalid JSON body".to_string()))
        }
    }
}

/// Set `context.platform_config`, keeping any other keys the caller put in `context`.
pub fn inject_platform_config(payload: &mut Value, platform: PlatformContext<'_>) {
    let Some(object) = payload.as_object_mut() else {
        return;
    };

    let context = object
        .entry("context")
        .or_insert_with(|| Value::Object(Map::new()));
    if !context.is_object() {
        *context = Value::Object(Map::new());
    }
    if let Some(context) = context.as_object_mut() {
        context.insert("platform_config".to_string(), platform.to_json());
    }
}

/// Hop-by-hop headers and framing are owned by our own connection.
fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    name == header::CONNECTION
        || name == header::TRANSFER_ENCODING
        || name == header::CONTENT_LENGTH
        || name == header::UPGRADE
        || name.as_str() == "keep-alive"
}

fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

fn event_stream_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers
}

/// Byte-for-byte relay of the backend body. Dropping the returned stream
/// (client went away) drops the backend response and closes that connection.
fn relay_body<S>(upstream: S, trace_id: String) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut relayed = 0usize;
        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    relayed += bytes.len();
                    yield Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(trace_id = %trace_id, error = %e, "backend body interrupted");
                    yield Err(std::io::Error::new(std::io::ErrorKind::Other, e));
                    return;
                }
            }
        }
        tracing::debug!(trace_id = %trace_id, bytes = relayed, "backend body finished");
    }
}

pub struct Forwarder {
    http_client: Client,
    request_timeout: Duration,
}

impl Forwarder {
    pub fn new(config: &GatewayConfig) -> Result<Self, String> {
        Ok(Self {
            // No client-wide timeout: streams stay open as long as the backend talks.
            http_client: build_http_client(None)?,
            request_timeout: config.request_timeout(),
        })
    }

    pub async fn forward(
        &self,
        record: &DeploymentRecord,
        payload: &Value,
        mode: ForwardMode,
    ) -> Result<Response, GatewayError> {
        let url = record.endpoint_url(mode.endpoint());
        let trace_id = uuid::Uuid::new_v4().simple().to_string();

        let mut request = self.http_client.post(&url).json(payload);
        if mode == ForwardMode::Unary {
            request = request.timeout(self.request_timeout);
        }

        let upstream = request.send().await.map_err(|e| {
            tracing::warn!(
                trace_id = %trace_id,
                manifest_id = %record.manifest_id,
                url = %url,
                error = %e,
                "backend unreachable"
            );
            GatewayError::UpstreamFailure(e.to_string())
        })?;

        let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        tracing::info!(
            trace_id = %trace_id,
            manifest_id = %record.manifest_id,
            mode = ?mode,
            status = status.as_u16(),
            "forwarded workforce call"
        );

        let headers = match mode {
            ForwardMode::Unary => relay_headers(upstream.headers()),
            ForwardMode::Stream => event_stream_headers(),
        };

        let mut response = Response::new(Body::from_stream(relay_body(upstream.bytes_stream(), trace_id)));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
