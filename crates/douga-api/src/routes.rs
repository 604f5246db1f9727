//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    did_document, get_job_status, get_upload_limits, health, ready, root, upload_video,
    watch_artifact,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    allow_any_origin, cors_layer, hide_internal_errors, request_id, request_logging,
    security_headers,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    // Upload bodies are whole videos; the default 2MB extractor limit is
    // replaced by the configured one.
    let upload_routes = Router::new()
        .route("/xrpc/app.bsky.video.uploadVideo", post(upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    let xrpc_routes = Router::new()
        .route("/xrpc/app.bsky.video.getJobStatus", get(get_job_status))
        .route("/xrpc/app.bsky.video.getUploadLimits", get(get_upload_limits))
        .merge(upload_routes);

    let watch_routes = Router::new()
        .route("/watch/:did/:cid/*file", get(watch_artifact))
        .route_layer(middleware::from_fn(allow_any_origin));

    let identity_routes = Router::new()
        .route("/", get(root))
        .route("/.well-known/did.json", get(did_document));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let cors = cors_layer(&state.config.cors_origins());

    Router::new()
        .merge(xrpc_routes)
        .merge(watch_routes)
        .merge(identity_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(
            state.config.is_production(),
            hide_internal_errors,
        ))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors)
        .with_state(state)
}
