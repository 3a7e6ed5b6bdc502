//! Push notification channel.
//!
//! A channel is opened per session: the client sends `{videoKey}` once, then
//! only listens. Every frame the server pushes is forwarded to the uploader
//! inbox tagged with the session key.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use vdo_models::{ChannelHello, CorrelationKey, NotificationMessage};

use crate::error::{UploaderError, UploaderResult};
use crate::event::{ChannelEvent, UploaderEvent};

/// Opens notification channels for a session key.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(
        &self,
        key: &CorrelationKey,
        events: mpsc::Sender<UploaderEvent>,
    ) -> UploaderResult<ChannelHandle>;
}

/// A live channel. Dropping the handle closes it without telling the server.
#[derive(Debug)]
pub struct ChannelHandle {
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Handle with nothing behind it, for connectors that push events themselves.
    pub fn detached() -> Self {
        Self { task: None }
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// WebSocket connector.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(
        &self,
        key: &CorrelationKey,
        events: mpsc::Sender<UploaderEvent>,
    ) -> UploaderResult<ChannelHandle> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| UploaderError::channel(format!("connect {}: {}", self.url, e)))?;
        let (mut sender, mut receiver) = stream.split();

        let hello = serde_json::to_string(&ChannelHello::new(key.clone()))?;
        sender
            .send(Message::Text(hello))
            .await
            .map_err(|e| UploaderError::channel(e.to_string()))?;
        debug!(video_key = %key, url = %self.url, "Notification channel open");

        let key = key.clone();
        let task = tokio::spawn(async move {
            // Held so the write half stays open while listening
            let _sender = sender;

            while let Some(frame) = receiver.next().await {
                let event = match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<NotificationMessage>(&text) {
                            Ok(message) => ChannelEvent::Message(message),
                            Err(e) => {
                                warn!(
                                    video_key = %key,
                                    error = %e,
                                    "Ignoring malformed notification"
                                );
                                continue;
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = events
                            .send(UploaderEvent::Channel {
                                key,
                                event: ChannelEvent::Error(e.to_string()),
                            })
                            .await;
                        return;
                    }
                };

                if events
                    .send(UploaderEvent::Channel {
                        key: key.clone(),
                        event,
                    })
                    .await
                    .is_err()
                {
                    // Uploader is gone
                    return;
                }
            }

            let _ = events
                .send(UploaderEvent::Channel {
                    key,
                    event: ChannelEvent::Closed,
                })
                .await;
        });

        Ok(ChannelHandle::new(task))
    }
}
