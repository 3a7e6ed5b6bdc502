//! Uploader error types.

use thiserror::Error;
use vdo_models::CorrelationKey;

pub type UploaderResult<T> = Result<T, UploaderError>;

#[derive(Debug, Error)]
pub enum UploaderError {
    #[error("Invalid file: {0}")]
    Validation(String),

    #[error("An upload is already in progress for {0}")]
    SessionPending(CorrelationKey),

    #[error("No upload session")]
    NoSession,

    #[error("Could not obtain upload credential: {0}")]
    CredentialUnavailable(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Notification channel error: {0}")]
    Channel(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Session store error: {0}")]
    Store(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploaderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn credential_unavailable(msg: impl Into<String>) -> Self {
        Self::CredentialUnavailable(msg.into())
    }

    pub fn upload_failed(msg: impl Into<String>) -> Self {
        Self::UploadFailed(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn inference_failed(msg: impl Into<String>) -> Self {
        Self::InferenceFailed(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the user can simply try the same action again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CredentialUnavailable(_)
                | Self::UploadFailed(_)
                | Self::InferenceFailed(_)
                | Self::Http(_)
        )
    }
}
