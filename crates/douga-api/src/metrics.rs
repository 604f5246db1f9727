//! Prometheus metrics for the API server.

use std::time::Instant;

use anyhow::Context;
use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "douga_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "douga_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "douga_http_requests_in_flight";

    // Watch metrics
    pub const ARTIFACT_BYTES_SERVED_TOTAL: &str = "douga_artifact_bytes_served_total";
    pub const ARTIFACT_NOT_READY_TOTAL: &str = "douga_artifact_not_ready_total";

    // Upload metrics
    pub const UPLOAD_BYTES_TOTAL: &str = "douga_upload_bytes_total";
}

/// Label for requests that matched no route.
const UNMATCHED_PATH: &str = "unmatched";

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record bytes of a served artifact file.
pub fn record_artifact_served(kind: &str, bytes: usize) {
    let labels = [("kind", kind.to_string())];
    counter!(names::ARTIFACT_BYTES_SERVED_TOTAL, &labels).increment(bytes as u64);
}

/// Record a watch request answered with "still deriving".
pub fn record_artifact_not_ready(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::ARTIFACT_NOT_READY_TOTAL, &labels).increment(1);
}

/// Record an accepted upload body.
pub fn record_upload_bytes(bytes: usize) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes as u64);
}

/// Metrics middleware for HTTP requests.
///
/// Paths are labelled with the route template (`/watch/:did/:cid/*file`)
/// so per-video URLs don't explode label cardinality.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(request.extensions().get::<MatchedPath>());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

fn route_label(matched: Option<&MatchedPath>) -> String {
    matched
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_route_label() {
        assert_eq!(route_label(None), "unmatched");
    }
}
