//! HTTP client for the reference backend and presigned storage URLs.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use vdo_models::{CorrelationKey, PathListResponse, PresignedUrl, SegmentationPoints};

use crate::config::UploaderConfig;
use crate::error::{UploaderError, UploaderResult};
use crate::poll::ReadinessProbe;
use crate::segmentation::InferenceOutput;
use crate::uploader::UploadFile;

/// A presigned write URL together with the key it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCredential {
    pub key: CorrelationKey,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail")]
    error: String,
}

/// Backend client.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    config: UploaderConfig,
}

impl BackendClient {
    /// Create a new client.
    pub fn new(config: UploaderConfig) -> UploaderResult<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Request a write credential and a fresh correlation key.
    pub async fn presign_put(&self) -> UploaderResult<WriteCredential> {
        let url = self.config.endpoint(&self.config.paths.presign_put);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| UploaderError::credential_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = error_text(response).await;
            return Err(UploaderError::credential_unavailable(format!("{status}: {reason}")));
        }

        let body: PresignedUrl = response
            .json()
            .await
            .map_err(|e| UploaderError::credential_unavailable(e.to_string()))?;
        let key = body
            .key
            .ok_or_else(|| UploaderError::credential_unavailable("response carries no key"))?;

        debug!(video_key = %key, "Write credential issued");
        Ok(WriteCredential {
            key,
            url: body.presigned_url,
        })
    }

    /// PUT the raw file body to a presigned URL.
    pub async fn upload(&self, url: &str, file: &UploadFile) -> UploaderResult<()> {
        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, file.content_type.as_str())
            .body(file.bytes.clone())
            .send()
            .await
            .map_err(|e| UploaderError::upload_failed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = error_text(response).await;
            return Err(UploaderError::upload_failed(format!("{status}: {reason}")));
        }

        info!(file = %file.name, bytes = file.bytes.len(), "Uploaded raw object");
        Ok(())
    }

    /// Request a read credential for a key.
    pub async fn presign_get(&self, key: &CorrelationKey) -> UploaderResult<String> {
        let url = self.config.endpoint(&self.config.paths.presign_get);
        let response = self
            .http
            .post(&url)
            .query(&[("key", key.as_str())])
            .send()
            .await
            .map_err(|e| UploaderError::credential_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = error_text(response).await;
            return Err(UploaderError::credential_unavailable(format!("{status}: {reason}")));
        }

        let body: PresignedUrl = response
            .json()
            .await
            .map_err(|e| UploaderError::credential_unavailable(e.to_string()))?;
        Ok(body.presigned_url)
    }

    /// Submit points to a JSON inference endpoint.
    pub async fn submit_points(
        &self,
        path: &str,
        points: &SegmentationPoints,
    ) -> UploaderResult<PathListResponse> {
        let url = self.config.endpoint(path);
        let response = self
            .http
            .post(&url)
            .json(points)
            .send()
            .await
            .map_err(|e| UploaderError::inference_failed(e.to_string()))?;

        let response = check_inference(response).await?;
        Ok(response.json().await?)
    }

    /// Submit a reference image, the video key and the points as multipart.
    pub async fn submit_video(
        &self,
        image: &UploadFile,
        key: &CorrelationKey,
        points: &SegmentationPoints,
    ) -> UploaderResult<InferenceOutput> {
        let url = self.config.endpoint(&self.config.paths.inference_video);
        let image_part = Part::bytes(image.bytes.clone())
            .file_name(image.name.clone())
            .mime_str(&image.content_type)?;
        let form = Form::new()
            .part("image", image_part)
            .text("videoKey", key.to_string())
            .text("segmentationData", serde_json::to_string(points)?);

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "video/mp4")
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploaderError::inference_failed(e.to_string()))?;

        let response = check_inference(response).await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            Ok(InferenceOutput::Paths(response.json().await?))
        } else {
            Ok(InferenceOutput::Video(response.bytes().await?.to_vec()))
        }
    }
}

#[async_trait]
impl ReadinessProbe for BackendClient {
    async fn check(&self, uri: &str) -> UploaderResult<bool> {
        let response = self.http.head(uri).send().await?;
        Ok(response.status() == StatusCode::OK)
    }
}

async fn check_inference(response: Response) -> UploaderResult<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let reason = error_text(response).await;
    Err(UploaderError::inference_failed(format!("{status}: {reason}")))
}

/// Prefer the backend's `{error}` text, fall back to the raw body.
async fn error_text(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => parsed.error,
        Err(_) => body,
    }
}
