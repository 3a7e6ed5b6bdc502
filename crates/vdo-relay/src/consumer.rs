//! Per-batch queue consumer.

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, info, warn};
use vdo_models::{NotificationMessage, StorageEvent};

use crate::classify::{classify, EventKind};
use crate::metrics;
use crate::notifier::Notifier;

/// A message as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: Vec<u8>,
}

impl QueueMessage {
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }

    /// Message carrying a serialized storage event.
    pub fn from_event(id: impl Into<String>, event: &StorageEvent) -> serde_json::Result<Self> {
        Ok(Self::new(id, serde_json::to_vec(event)?))
    }
}

/// What should happen to a message once processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Retry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReport {
    pub id: String,
    pub kind: EventKind,
    pub outcome: Outcome,
}

/// Stateless consumer: classifies each message and relays the recognized ones.
#[derive(Clone)]
pub struct QueueConsumer {
    notifier: Arc<dyn Notifier>,
    key_marker: Option<String>,
}

impl QueueConsumer {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            key_marker: None,
        }
    }

    pub fn with_key_marker(mut self, marker: Option<String>) -> Self {
        self.key_marker = marker;
        self
    }

    /// Process a batch concurrently. Outcomes are independent per message
    /// and returned in input order.
    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> Vec<MessageReport> {
        let started = Instant::now();
        let count = messages.len();

        let reports = join_all(messages.into_iter().map(|message| self.process(message))).await;

        let retried = reports.iter().filter(|r| r.outcome == Outcome::Retry).count();
        info!(
            messages = count,
            retried,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed batch"
        );
        reports
    }

    async fn process(&self, message: QueueMessage) -> MessageReport {
        let event: StorageEvent = match serde_json::from_slice(&message.body) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "Undecodable queue message");
                return self.report(message.id, EventKind::Undecodable, Outcome::Retry);
            }
        };

        let kind = classify(&event, self.key_marker.as_deref());
        let Some(status) = kind.relay_status() else {
            debug!(
                message_id = %message.id,
                key = %event.key(),
                kind = %kind,
                "Acknowledging without relay"
            );
            return self.report(message.id, kind, Outcome::Ack);
        };

        let notification = NotificationMessage::new(event.correlation_key(), status);
        match self.notifier.notify(kind, &notification).await {
            Ok(()) => {
                info!(
                    message_id = %message.id,
                    video_key = %notification.video_key,
                    kind = %kind,
                    "Relayed storage event"
                );
                self.report(message.id, kind, Outcome::Ack)
            }
            Err(e) => {
                warn!(
                    message_id = %message.id,
                    video_key = %notification.video_key,
                    error = %e,
                    "Relay failed, retrying"
                );
                self.report(message.id, kind, Outcome::Retry)
            }
        }
    }

    fn report(&self, id: String, kind: EventKind, outcome: Outcome) -> MessageReport {
        metrics::record_message(kind, outcome);
        MessageReport { id, kind, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::error::{RelayError, RelayResult};
    use crate::notifier::MockNotifier;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(EventKind, NotificationMessage)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, kind: EventKind, message: &NotificationMessage) -> RelayResult<()> {
            self.sent.lock().unwrap().push((kind, message.clone()));
            Ok(())
        }
    }

    fn event(id: &str, key: &str) -> QueueMessage {
        QueueMessage::from_event(id, &StorageEvent::for_key(key)).unwrap()
    }

    #[tokio::test]
    async fn test_batch_relays_known_namespaces_once() {
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = QueueConsumer::new(notifier.clone());

        let reports = consumer
            .process_batch(vec![
                event("1", "videos/abc123"),
                event("2", "frames/abc123.zip"),
                event("3", "unrelated/file.txt"),
            ])
            .await;

        assert!(reports.iter().all(|r| r.outcome == Outcome::Ack));
        assert_eq!(
            reports.iter().map(|r| r.kind).collect::<Vec<_>>(),
            vec![EventKind::RawUpload, EventKind::DerivedArtifact, EventKind::Unrecognized]
        );

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.contains(&(
            EventKind::RawUpload,
            NotificationMessage::uploaded("videos/abc123")
        )));
        assert!(sent.contains(&(
            EventKind::DerivedArtifact,
            NotificationMessage::extracted("frames/abc123.zip")
        )));
    }

    #[tokio::test]
    async fn test_failed_relay_only_retries_that_message() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|_, message| message.video_key.as_str() == "videos/bad")
            .times(1)
            .returning(|_, _| {
                Err(RelayError::RelayFailed {
                    status: 500,
                    body: "boom".to_string(),
                })
            });
        notifier
            .expect_notify()
            .withf(|_, message| message.video_key.as_str() != "videos/bad")
            .times(2)
            .returning(|_, _| Ok(()));
        let consumer = QueueConsumer::new(Arc::new(notifier));

        let reports = consumer
            .process_batch(vec![
                event("1", "videos/good"),
                event("2", "videos/bad"),
                event("3", "frames/good.zip"),
            ])
            .await;

        let outcomes: Vec<_> = reports.iter().map(|r| (r.id.as_str(), r.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![("1", Outcome::Ack), ("2", Outcome::Retry), ("3", Outcome::Ack)]
        );
    }

    #[tokio::test]
    async fn test_undecodable_body_is_retried_without_relay() {
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer = QueueConsumer::new(notifier.clone());

        let reports = consumer.process_batch(vec![QueueMessage::new("1", "not json")]).await;

        assert_eq!(reports[0].kind, EventKind::Undecodable);
        assert_eq!(reports[0].outcome, Outcome::Retry);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_marker_skips_other_environment() {
        let notifier = Arc::new(RecordingNotifier::default());
        let consumer =
            QueueConsumer::new(notifier.clone()).with_key_marker(Some("DEV".to_string()));

        let reports = consumer
            .process_batch(vec![event("1", "videos/video-1"), event("2", "videos/video-2-DEV")])
            .await;

        assert_eq!(reports[0].kind, EventKind::OtherEnvironment);
        assert_eq!(reports[0].outcome, Outcome::Ack);
        assert_eq!(reports[1].kind, EventKind::RawUpload);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }
}
