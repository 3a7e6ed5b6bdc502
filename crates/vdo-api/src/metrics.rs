//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vdo_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vdo_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vdo_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "vdo_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "vdo_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "vdo_ws_messages_sent_total";

    // Workflow metrics
    pub const CREDENTIALS_ISSUED_TOTAL: &str = "vdo_credentials_issued_total";
    pub const NOTIFICATIONS_RECEIVED_TOTAL: &str = "vdo_notifications_received_total";
}

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

pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_sent(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Record a presigned credential, `kind` is "put" or "get".
pub fn record_credential_issued(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::CREDENTIALS_ISSUED_TOTAL, &labels).increment(1);
}

pub fn record_notification(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::NOTIFICATIONS_RECEIVED_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
///
/// Labels use the matched route, so query strings and unknown paths do not
/// grow label cardinality.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
