//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    frames_extraction_complete, health, object_ready, presigned_get_url, presigned_put_url,
    video_upload_complete,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging};
use crate::state::AppState;
use crate::ws::ws_notifications;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let credential_routes = Router::new()
        .route("/presigned-put-url", post(presigned_put_url))
        .route("/presigned-get-url", post(presigned_get_url));

    // Called by the storage event relay
    let notification_routes = Router::new()
        .route("/video-upload-complete", post(video_upload_complete))
        .route("/frames-extraction-complete", post(frames_extraction_complete));

    let ws_routes = Router::new().route("/ws", get(ws_notifications));

    // GET also answers HEAD
    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(object_ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(credential_routes)
        .merge(notification_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
