//! Router-level tests: the assembled gateway driven with `oneshot` against a
//! mocked authority (project access, OAuth token, discovery) and mocked backends.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use workforce_gateway::proxy::config::{GatewayConfig, ResolutionMode};
use workforce_gateway::proxy::deployment::{DeploymentCache, LocalManifests, NetworkDiscovery};
use workforce_gateway::proxy::{build_router, AppState};

const PROJECT_PATH: &str = "/orgs/1/projects/2";
const DEPLOYMENTS_PATH: &str = "/orgs/1/projects/2/deployments";

fn config_for(authority: &MockServer) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.api_url = authority.uri();
    config.auth_url = authority.uri();
    config.api_host = Some("api.test".into());
    config.org_id = "1".into();
    config.project_id = "2".into();
    config.project_env_id = "env-1".into();
    config.backend_scheme = "http".into();
    config.pages_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("pages");
    config
}

fn remote_app(config: GatewayConfig, cache: Arc<DeploymentCache>) -> Router {
    let discovery = NetworkDiscovery::new(&config, cache).unwrap();
    build_router(AppState::with_deployments(config, Arc::new(discovery)).unwrap())
}

async fn accept_bearer(authority: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path(PROJECT_PATH))
        .and(header_eq("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200))
        .mount(authority)
        .await;
}

async fn discover(authority: &MockServer, manifest_id: &str, domain: &str, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(DEPLOYMENTS_PATH))
        .and(query_param("manifest_id", manifest_id))
        .and(query_param("status", "running"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deployments": [{ "domain": domain, "target": { "id": 42 } }]
        })))
        .expect(expected_calls)
        .mount(authority)
        .await;
}

fn backend_domain(backend: &MockServer) -> String {
    backend.address().to_string()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

fn post_json(uri: &str, auth: Option<(&str, &str)>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some((name, value)) = auth {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

async fn backend_payloads(backend: &MockServer) -> Vec<Value> {
    backend
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_api_key_wins_over_cookies_and_forwards_no_token() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(PROJECT_PATH))
        .and(header_eq("x-api-key", "t2_key"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&authority)
        .await;
    Mock::given(method("GET"))
        .and(path(DEPLOYMENTS_PATH))
        .and(header_eq("x-api-key", "t2_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "deployments": [{ "domain": backend_domain(&backend), "target": { "id": 42 } }]
        })))
        .expect(1)
        .mount(&authority)
        .await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&backend)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let request = Request::builder()
        .method("POST")
        .uri("/workforce/foo")
        .header("x-api-key", "t2_key")
        .header(header::COOKIE, "timbal_access_token=cookie_token")
        .body(Body::from(r#"{"prompt":"hi","context":{"trace":"t1"}}"#))
        .unwrap();

    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(body_json(response).await, json!({ "ok": true }));

    let payloads = backend_payloads(&backend).await;
    assert_eq!(payloads.len(), 1);
    let payload = &payloads[0];
    assert_eq!(payload["prompt"], "hi");
    assert_eq!(payload["context"]["trace"], "t1");
    assert_eq!(
        payload["context"]["platform_config"],
        json!({
            "host": "api.test",
            "auth": { "type": "bearer", "token": null },
            "subject": { "org_id": "1", "app_id": "42" }
        })
    );
}

#[tokio::test]
async fn test_bearer_token_is_forwarded_to_backend() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    discover(&authority, "foo", &backend_domain(&backend), 1).await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&backend)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(
        &app,
        post_json("/workforce/foo", Some(("authorization", "Bearer abc")), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payloads = backend_payloads(&backend).await;
    assert_eq!(payloads[0]["context"]["platform_config"]["auth"]["token"], "abc");
}

#[tokio::test]
async fn test_me_with_bearer() {
    let authority = MockServer::start().await;
    accept_bearer(&authority, "abc").await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(&app, get("/auth/me", &[("authorization", "Bearer abc")])).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "authenticated": true, "user": { "id": "timbal-authenticated" } })
    );
}

#[tokio::test]
async fn test_expired_session_is_refreshed_and_cookies_rotated() {
    let authority = MockServer::start().await;
    accept_bearer(&authority, "a2").await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a2", "refresh_token": "r2" })),
        )
        .expect(1)
        .mount(&authority)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(
        &app,
        get(
            "/verify",
            &[("cookie", "timbal_access_token=expired; timbal_refresh_token=r1")],
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("timbal_access_token=a2")));
    assert!(cookies.iter().any(|c| c.starts_with("timbal_refresh_token=r2")));

    let body = body_json(response).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["user"]["id"], "timbal-authenticated");
}

#[tokio::test]
async fn test_invalid_refresh_cookie_is_rejected_and_cleared() {
    let authority = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&authority)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(&app, get("/verify", &[("cookie", "timbal_refresh_token=stale")])).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));
    assert_eq!(body_json(response).await, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn test_rejected_caller_never_reaches_discovery() {
    let authority = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DEPLOYMENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&authority)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(
        &app,
        post_json("/workforce/foo", Some(("authorization", "Bearer nope")), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_deployment_is_503_and_not_cached() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    Mock::given(method("GET"))
        .and(path(DEPLOYMENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deployments": [] })))
        .expect(2)
        .mount(&authority)
        .await;

    let cache = Arc::new(DeploymentCache::new());
    let app = remote_app(config_for(&authority), cache.clone());

    for _ in 0..2 {
        let response = send(
            &app,
            post_json("/workforce/foo", Some(("authorization", "Bearer abc")), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
    assert!(cache.is_empty());
    assert!(backend_payloads(&backend).await.is_empty());
}

#[tokio::test]
async fn test_dead_backend_is_502_and_stays_cached() {
    let authority = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    discover(&authority, "foo", "127.0.0.1:1", 1).await;

    let cache = Arc::new(DeploymentCache::new());
    let app = remote_app(config_for(&authority), cache.clone());

    for _ in 0..2 {
        let response = send(
            &app,
            post_json("/workforce/foo", Some(("authorization", "Bearer abc")), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = body_json(response).await;
        assert!(!body["error"].as_str().unwrap().contains("127.0.0.1"));
    }
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_invalid_payload_is_400() {
    let authority = MockServer::start().await;
    accept_bearer(&authority, "abc").await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let request = Request::builder()
        .method("POST")
        .uri("/workforce/foo")
        .header("authorization", "Bearer abc")
        .body(Body::from("[1,2,3]"))
        .unwrap();
    assert_eq!(send(&app, request).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unary_relays_backend_response_verbatim() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    discover(&authority, "foo", &backend_domain(&backend), 1).await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(
            ResponseTemplate::new(418)
                .insert_header("x-backend", "yes")
                .set_body_raw(r#"{"err":"teapot"}"#, "application/json"),
        )
        .mount(&backend)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(
        &app,
        post_json("/workforce/foo", Some(("authorization", "Bearer abc")), json!({})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(response.headers().get("x-backend").unwrap(), "yes");
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(body_bytes(response).await, br#"{"err":"teapot"}"#.to_vec());
}

#[tokio::test]
async fn test_stream_forces_event_stream_headers() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    discover(&authority, "foo", &backend_domain(&backend), 1).await;
    let events = "data: {\"delta\":\"a\"}\n\ndata: {\"delta\":\"b\"}\n\n";
    Mock::given(method("POST"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events, "application/octet-stream"))
        .mount(&backend)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));
    let response = send(
        &app,
        post_json("/workforce/foo/stream", Some(("authorization", "Bearer abc")), json!({})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/event-stream");
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(headers.get(header::CONNECTION).unwrap(), "keep-alive");
    assert_eq!(body_bytes(response).await, events.as_bytes().to_vec());
}

#[tokio::test]
async fn test_api_prefix_serves_the_same_routes() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    discover(&authority, "foo", &backend_domain(&backend), 1).await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&backend)
        .await;

    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(
        &app,
        post_json("/api/workforce/foo", Some(("authorization", "Bearer abc")), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let health = send(&app, get("/api/healthcheck", &[])).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["status"], "ok");

    let unauthenticated = send(&app, post_json("/api/workforce/foo", None, json!({}))).await;
    assert_eq!(unauthenticated.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_docs_redirects_to_login_and_clears_cookies() {
    let authority = MockServer::start().await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(&app, get("/docs", &[("cookie", "timbal_access_token=stale")])).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies.iter().all(|c| c.contains("Max-Age=0")));

    let prefixed = send(&app, get("/api/docs", &[])).await;
    assert_eq!(prefixed.status(), StatusCode::FOUND);
    assert_eq!(prefixed.headers().get(header::LOCATION).unwrap(), "/api/auth/login");
}

#[tokio::test]
async fn test_root_redirects_to_docs() {
    let authority = MockServer::start().await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(&app, get("/", &[])).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/docs");
}

#[tokio::test]
async fn test_oauth_redirect_uses_public_origin() {
    let authority = MockServer::start().await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(
        &app,
        get("/auth/github", &[("host", "gateway.example.com")]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap(),
        format!(
            "{}/oauth/authorize?provider=github&redirect_uri=https%3A%2F%2Fgateway.example.com%2Fauth%2Fcallback",
            authority.uri()
        )
    );

    let unknown = send(&app, get("/auth/myspace", &[])).await;
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_token_sets_session_cookies() {
    let authority = MockServer::start().await;
    accept_bearer(&authority, "a1").await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(
        &app,
        post_json(
            "/auth/set-token",
            None,
            json!({ "access_token": "a1", "refresh_token": "r1" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("timbal_access_token=a1")));
    assert!(cookies.iter().any(|c| c.starts_with("timbal_refresh_token=r1")));

    let invalid = send(&app, post_json("/auth/set-token", None, json!({ "access_token": "bad" }))).await;
    assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&invalid).is_empty());

    let missing = send(&app, post_json("/auth/set-token", None, json!({}))).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_refresh_endpoint() {
    let authority = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a2", "refresh_token": "r2" })),
        )
        .mount(&authority)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("refresh_token=stale"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&authority)
        .await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let missing = send(&app, post_json("/auth/refresh", None, json!({}))).await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

    let from_cookie = Request::builder()
        .method("POST")
        .uri("/auth/refresh")
        .header(header::COOKIE, "timbal_refresh_token=r1")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, from_cookie).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(set_cookies(&response).len(), 2);
    assert_eq!(
        body_json(response).await,
        json!({ "success": true, "refresh_token": "r2" })
    );

    let stale = send(&app, post_json("/auth/refresh", None, json!({ "refresh_token": "stale" }))).await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&stale).iter().all(|c| c.contains("Max-Age=0")));
}

#[tokio::test]
async fn test_logout_clears_cookies_and_redirects() {
    let authority = MockServer::start().await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(&app, post_json("/auth/logout", None, json!({}))).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/auth/login");
    assert_eq!(set_cookies(&response).len(), 2);
}

#[tokio::test]
async fn test_local_mode_forwards_payload_untouched() {
    let authority = MockServer::start().await;
    let backend = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    Mock::given(method("GET"))
        .and(path(DEPLOYMENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&authority)
        .await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&backend)
        .await;

    let manifests = tempfile::tempdir().unwrap();
    std::fs::create_dir(manifests.path().join("foo")).unwrap();
    std::fs::write(manifests.path().join("foo/manifest.json"), r#"{ "id": "foo" }"#).unwrap();

    let mut config = config_for(&authority);
    config.resolution = ResolutionMode::Local;
    config.local.manifests_dir = Some(manifests.path().to_path_buf());
    config.local.base_port = backend.address().port();

    let local = LocalManifests::new(manifests.path().to_path_buf(), backend.address().port());
    let app = build_router(AppState::with_deployments(config, Arc::new(local)).unwrap());

    let payload = json!({ "prompt": "hi", "context": { "trace": "t1" } });
    let response = send(
        &app,
        post_json("/workforce/foo", Some(("authorization", "Bearer abc")), payload.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(backend_payloads(&backend).await, vec![payload]);

    let listing = send(&app, get("/workforce", &[("authorization", "Bearer abc")])).await;
    assert_eq!(listing.status(), StatusCode::OK);
    let body = body_json(listing).await;
    assert_eq!(body["resolution"], "local");
    assert_eq!(body["deployments"][0]["manifest_id"], "foo");
}

#[tokio::test]
async fn test_magic_link_rejects_missing_email_without_serde_detail() {
    let authority = MockServer::start().await;
    let app = remote_app(config_for(&authority), Arc::new(DeploymentCache::new()));

    let response = send(&app, post_json("/auth/magic-link", None, json!({ "mail": "a@b.c" }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": "email is required" }));

    let request = Request::builder()
        .method("POST")
        .uri("/auth/magic-link")
        .body(Body::from("{\"email\":"))
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": "invalid JSON body" }));
}

/// Backend that answers with a chunked SSE body, one frame every 50ms, and
/// reports whether a write eventually failed because the peer went away.
async fn spawn_endless_sse_backend() -> (u16, tokio::sync::oneshot::Receiver<bool>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let _ = socket.read(&mut buf).await;

        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ntransfer-encoding: chunked\r\n\r\n";
        let mut torn_down = socket.write_all(head.as_bytes()).await.is_err();
        let frame = "data: x\n\n";
        let chunk = format!("{:x}\r\n{}\r\n", frame.len(), frame);

        for _ in 0..200 {
            if torn_down {
                break;
            }
            if socket.write_all(chunk.as_bytes()).await.is_err() || socket.flush().await.is_err() {
                torn_down = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        let _ = done_tx.send(torn_down);
    });

    (port, done_rx)
}

#[tokio::test]
async fn test_client_disconnect_tears_down_backend_stream() {
    use futures::StreamExt;

    let authority = MockServer::start().await;
    accept_bearer(&authority, "abc").await;
    let (backend_port, torn_down) = spawn_endless_sse_backend().await;

    let manifests = tempfile::tempdir().unwrap();
    std::fs::write(manifests.path().join("foo.json"), r#"{ "id": "foo" }"#).unwrap();

    let mut config = config_for(&authority);
    config.resolution = ResolutionMode::Local;
    config.local.manifests_dir = Some(manifests.path().to_path_buf());
    config.local.base_port = backend_port;

    let local = LocalManifests::new(manifests.path().to_path_buf(), backend_port);
    let app = build_router(AppState::with_deployments(config, Arc::new(local)).unwrap());

    let response = send(
        &app,
        post_json("/workforce/foo/stream", Some(("authorization", "Bearer abc")), json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(std::time::Duration::from_secs(5), frames.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(first.starts_with(b"data: x"));
    drop(frames);

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(15), torn_down)
        .await
        .unwrap()
        .unwrap();
    assert!(outcome, "backend kept streaming after the client went away");
}
