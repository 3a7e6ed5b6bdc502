//! Readiness of a processed result, for clients that poll.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use tracing::debug;

use crate::error::ApiResult;
use crate::handlers::presign::KeyQuery;
use crate::state::AppState;

/// `200` once the upload's processing finished, `404` until then.
///
/// Finished means the hub saw the completion, or the derived frames
/// archive is already in storage.
pub async fn object_ready(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> ApiResult<StatusCode> {
    let key = query.require()?.video_key()?;

    if state.hub.is_completed(&key).await {
        return Ok(StatusCode::OK);
    }

    let artifact = key.frames_key()?;
    let exists = state.storage.exists(artifact.as_str()).await?;
    debug!(video_key = %key, artifact = %artifact, exists, "Readiness check");

    Ok(if exists { StatusCode::OK } else { StatusCode::NOT_FOUND })
}
