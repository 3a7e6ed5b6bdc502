//! Completion endpoints called by the storage event relay.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;
use vdo_models::{Namespace, NotificationMessage, NotificationStatus};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Acknowledgement returned to the relay.
#[derive(Debug, Serialize)]
pub struct NotificationAck {
    #[serde(rename = "videoKey")]
    pub video_key: String,
    pub status: String,
    pub delivered: usize,
}

fn decode(
    payload: Result<Json<NotificationMessage>, JsonRejection>,
) -> ApiResult<NotificationMessage> {
    payload.map(|Json(message)| message).map_err(|e| {
        ApiError::bad_request(format!("invalid notification payload: {}", e.body_text()))
    })
}

/// A raw upload landed in storage. Waiting clients learn that processing started.
pub async fn video_upload_complete(
    State(state): State<AppState>,
    payload: Result<Json<NotificationMessage>, JsonRejection>,
) -> ApiResult<Json<NotificationAck>> {
    let notification = decode(payload)?;
    metrics::record_notification("video_upload_complete");

    let key = notification.video_key;
    if key.namespace() != Some(Namespace::Videos) {
        return Err(ApiError::bad_request(format!("{} is not a raw upload key", key)));
    }
    info!(video_key = %key, status = %notification.status.as_str(), "Upload notification received");

    let message = NotificationMessage::new(key.clone(), NotificationStatus::Processing)
        .with_message("video uploaded");
    let delivered = state.hub.publish(message).await;

    Ok(Json(NotificationAck {
        video_key: key.to_string(),
        status: NotificationStatus::Processing.as_str().to_string(),
        delivered,
    }))
}

/// The frames archive for an upload was written. Its session is complete.
///
/// Repeats for the same key are accepted and not pushed again.
pub async fn frames_extraction_complete(
    State(state): State<AppState>,
    payload: Result<Json<NotificationMessage>, JsonRejection>,
) -> ApiResult<Json<NotificationAck>> {
    let notification = decode(payload)?;
    metrics::record_notification("frames_extraction_complete");

    let video_key = notification.video_key.video_key()?;
    info!(
        frames_key = %notification.video_key,
        video_key = %video_key,
        status = %notification.status.as_str(),
        "Frame extraction notification received"
    );

    let message =
        NotificationMessage::completed(video_key.clone()).with_message("frame extraction");
    let delivered = state.hub.publish(message).await;

    Ok(Json(NotificationAck {
        video_key: video_key.to_string(),
        status: NotificationStatus::Completed.as_str().to_string(),
        delivered,
    }))
}
