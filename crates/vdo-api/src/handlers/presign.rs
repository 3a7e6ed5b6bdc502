//! Presigned credential handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use vdo_models::{CorrelationKey, PresignedUrl};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: Option<String>,
}

impl KeyQuery {
    /// The `key` parameter, required and non-blank.
    pub fn require(self) -> ApiResult<CorrelationKey> {
        let raw = self.key.ok_or_else(|| ApiError::bad_request("key is required"))?;
        Ok(CorrelationKey::parse(&raw)?)
    }
}

/// Issue a write credential under a fresh key in the `videos/` namespace.
pub async fn presigned_put_url(State(state): State<AppState>) -> ApiResult<Json<PresignedUrl>> {
    let key = CorrelationKey::generate(state.config.key_marker.as_deref());
    let url = state.storage.presign_put(key.as_str()).await?;

    metrics::record_credential_issued("put");
    info!(video_key = %key, "Issued write credential");
    Ok(Json(PresignedUrl::new(url, key)))
}

/// Issue a read credential for an existing key.
pub async fn presigned_get_url(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
) -> ApiResult<Json<PresignedUrl>> {
    let key = query.require()?;
    let url = state.storage.presign_get(key.as_str()).await?;

    metrics::record_credential_issued("get");
    info!(video_key = %key, "Issued read credential");
    Ok(Json(PresignedUrl::new(url, key)))
}
