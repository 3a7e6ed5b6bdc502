//! Backend notification over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use vdo_models::NotificationMessage;

use crate::classify::EventKind;
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};

/// Delivers one relay message to the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, kind: EventKind, message: &NotificationMessage) -> RelayResult<()>;
}

/// POSTs JSON to the backend's completion endpoints.
#[derive(Clone)]
pub struct HttpNotifier {
    http: Client,
    config: RelayConfig,
}

impl HttpNotifier {
    pub fn new(config: RelayConfig) -> RelayResult<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    fn url_for(&self, kind: EventKind) -> RelayResult<String> {
        match kind {
            EventKind::RawUpload => Ok(self.config.endpoint(&self.config.upload_complete_path)),
            EventKind::DerivedArtifact => {
                Ok(self.config.endpoint(&self.config.frames_complete_path))
            }
            other => Err(RelayError::invalid_message(format!("{other} events are not relayed"))),
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, kind: EventKind, message: &NotificationMessage) -> RelayResult<()> {
        let url = self.url_for(kind)?;
        let response = self.http.post(&url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::RelayFailed {
                status: status.as_u16(),
                body,
            });
        }

        debug!(
            url = %url,
            video_key = %message.video_key,
            status = status.as_u16(),
            "Backend notified"
        );
        Ok(())
    }
}
