use axum::http::{header, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

/// Browser clients on any origin may call the gateway with their cookies.
///
/// Credentials rule out `*`, so the request's origin and headers are mirrored back.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
