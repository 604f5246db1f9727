//! API middleware.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response};
use axum::middleware::Next;
use tower_http::cors::CorsLayer;
use tracing::{field, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::error::redact_internal;

const CORS_MAX_AGE: Duration = Duration::from_secs(12 * 3600); // 12 hours

/// Create CORS layer for the configured origins.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_headers = [
        header::ORIGIN,
        header::AUTHORIZATION,
        HeaderName::from_static("atproto-accept-labelers"),
        header::CONTENT_TYPE,
        header::CONTENT_LENGTH,
    ];

    let exposed_headers = [header::CONTENT_LENGTH, header::CONTENT_TYPE];

    let allowed_methods = [Method::GET, Method::POST, Method::PUT, Method::PATCH];

    // Explicit origins only: tower-http rejects credentials combined with wildcards.
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

    CorsLayer::new()
        .allow_methods(allowed_methods)
        .allow_headers(allowed_headers)
        .expose_headers(exposed_headers)
        .allow_credentials(true)
        .allow_origin(origins)
        .max_age(CORS_MAX_AGE)
}

/// Open CORS for watch responses; players on any origin fetch segments.
pub async fn allow_any_origin(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

/// Security headers middleware.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "X-Permitted-Cross-Domain-Policies",
        HeaderValue::from_static("none"),
    );

    response
}

/// Request ID middleware.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let request_id = request
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(request_id.clone());
    Span::current().record("request_id", request_id.as_str());

    let mut response = next.run(request).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

/// Hides internal error details when running in production.
pub async fn hide_internal_errors(
    State(production): State<bool>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let response = next.run(request).await;
    if production {
        redact_internal(response)
    } else {
        response
    }
}

/// Request logging middleware.
///
/// Runs the request inside a `request` span; [`request_id`] fills in its
/// `request_id` field, so everything logged while handling carries it.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let span = info_span!(
        "request",
        method = %method,
        uri = %uri,
        request_id = field::Empty,
    );

    async move {
        let start = Instant::now();
        let response = next.run(request).await;

        let status = response.status();
        let duration = start.elapsed();

        // Skip health check logging
        if !matches!(uri.path(), "/health" | "/healthz" | "/ready" | "/metrics") {
            info!(
                status = %status,
                duration_ms = %duration.as_millis(),
                "Request completed"
            );
        }

        response
    }
    .instrument(span)
    .await
}
