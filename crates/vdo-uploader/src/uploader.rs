//! Upload coordinator.
//!
//! `Uploader` owns the one active session, its persisted key, the
//! segmentation draft and the tasks listening for completion. Channel and
//! poll tasks never touch that state; they push [`UploaderEvent`]s into an
//! inbox that the owner drains through [`Uploader::next_event`] or
//! [`Uploader::wait_until_ready`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vdo_models::{CorrelationKey, NotificationMessage, PathListResponse, SessionStatus};

use crate::channel::{ChannelConnector, ChannelHandle, WsConnector};
use crate::client::BackendClient;
use crate::config::UploaderConfig;
use crate::error::{UploaderError, UploaderResult};
use crate::event::{ChannelEvent, UploaderEvent};
use crate::poll::{PollHandle, ReadinessProbe};
use crate::segmentation::{InferenceOutput, PointsEndpoint, SegmentationDraft};
use crate::session::{Transition, UploadSession};
use crate::store::{FileSessionStore, PersistedSession, SessionStore};

const EVENT_BUFFER_SIZE: usize = 64;

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Playback duration, when the caller could determine it
    pub duration: Option<Duration>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    fn validate(&self, max_duration: Duration) -> UploaderResult<()> {
        if self.bytes.is_empty() {
            return Err(UploaderError::validation(format!("{} is empty", self.name)));
        }
        if let Some(duration) = self.duration {
            if duration > max_duration {
                return Err(UploaderError::validation(format!(
                    "video is {:.1}s long, the limit is {:.1}s",
                    duration.as_secs_f64(),
                    max_duration.as_secs_f64()
                )));
            }
        }
        Ok(())
    }
}

/// A processed result ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyObject {
    pub key: CorrelationKey,
    pub url: String,
}

pub struct Uploader {
    config: UploaderConfig,
    client: BackendClient,
    store: Box<dyn SessionStore>,
    connector: Arc<dyn ChannelConnector>,
    probe: Arc<dyn ReadinessProbe>,
    session: Option<UploadSession>,
    draft: SegmentationDraft,
    channel: Option<ChannelHandle>,
    poll: Option<PollHandle>,
    events_tx: mpsc::Sender<UploaderEvent>,
    events_rx: mpsc::Receiver<UploaderEvent>,
    store_checked: bool,
}

impl Uploader {
    /// Uploader with a file-backed store, a WebSocket channel and HTTP polling.
    pub fn new(config: UploaderConfig) -> UploaderResult<Self> {
        let client = BackendClient::new(config.clone())?;
        let store = Box::new(FileSessionStore::new(config.state_path.clone()));
        let connector = Arc::new(WsConnector::new(config.ws_url.clone()));
        let probe = Arc::new(client.clone());
        Ok(Self::with_parts(client, store, connector, probe))
    }

    /// Assemble an uploader from explicit parts.
    pub fn with_parts(
        client: BackendClient,
        store: Box<dyn SessionStore>,
        connector: Arc<dyn ChannelConnector>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        Self {
            config: client.config().clone(),
            client,
            store,
            connector,
            probe,
            session: None,
            draft: SegmentationDraft::new(),
            channel: None,
            poll: None,
            events_tx,
            events_rx,
            store_checked: false,
        }
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.session.as_ref().map(|s| s.status())
    }

    pub fn draft(&self) -> &SegmentationDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut SegmentationDraft {
        &mut self.draft
    }

    /// Whether a push channel or a poll is currently listening.
    pub fn is_listening(&self) -> bool {
        self.channel.is_some() || self.poll.is_some()
    }

    /// Upload a file and start listening for its completion.
    ///
    /// The channel is opened before the body is sent so a fast completion
    /// cannot be missed. The key is persisted only once the body is stored.
    pub async fn begin_upload(&mut self, file: UploadFile) -> UploaderResult<CorrelationKey> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_waiting()) {
            return Err(UploaderError::SessionPending(session.key().clone()));
        }
        file.validate(self.config.max_duration)?;

        // A new upload replaces whatever finished before it
        self.teardown();
        self.session = None;
        self.store_checked = true;

        let credential = self.client.presign_put().await?;
        let key = credential.key.clone();
        info!(video_key = %key, file = %file.name, "Starting upload");

        self.session = Some(UploadSession::new(key.clone()));
        self.listen(&key).await;

        if let Err(e) = self.client.upload(&credential.url, &file).await {
            warn!(video_key = %key, error = %e, "Upload failed, abandoning session");
            self.teardown();
            if let Some(session) = self.session.as_mut() {
                session.apply(SessionStatus::Failed);
            }
            return Err(e);
        }

        if let Some(session) = self.session.as_mut() {
            session.apply(SessionStatus::Uploaded);
        }
        if let Err(e) = self.store.save(&PersistedSession::new(key.clone())) {
            warn!(video_key = %key, error = %e, "Could not persist session key");
        }
        Ok(key)
    }

    /// Pick up a session persisted by an earlier run.
    ///
    /// The store is read once per uploader. Calling again while that session
    /// is being waited on returns its key without opening anything.
    pub async fn resume_if_pending(&mut self) -> UploaderResult<Option<CorrelationKey>> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_waiting()) {
            return Ok(Some(session.key().clone()));
        }
        if self.store_checked {
            return Ok(None);
        }
        self.store_checked = true;

        let Some(persisted) = self.store.load()? else {
            return Ok(None);
        };
        if persisted.is_expired(self.config.resume_ttl) {
            info!(
                video_key = %persisted.video_key,
                created_at = %persisted.created_at,
                "Discarding expired session"
            );
            self.store.clear()?;
            return Ok(None);
        }

        let key = persisted.video_key;
        info!(video_key = %key, "Resuming pending session");
        self.session = Some(UploadSession::resumed(key.clone(), persisted.created_at));
        self.listen(&key).await;
        Ok(Some(key))
    }

    /// Apply a pushed notification.
    ///
    /// Returns the displayable result when this message completes the session.
    pub async fn on_notification(
        &mut self,
        message: NotificationMessage,
    ) -> UploaderResult<Option<ReadyObject>> {
        let Some(session) = self.session.as_ref() else {
            debug!(video_key = %message.video_key, "Notification without a session");
            return Ok(None);
        };
        if session.key() != &message.video_key {
            debug!(
                video_key = %message.video_key,
                current = %session.key(),
                "Ignoring notification for another key"
            );
            return Ok(None);
        }
        let Some(next) = message.status.session_status() else {
            debug!(
                video_key = %message.video_key,
                status = %message.status.as_str(),
                "Ignoring unknown status"
            );
            return Ok(None);
        };
        self.transition(next).await
    }

    /// Handle one inbox event.
    pub async fn handle_event(
        &mut self,
        event: UploaderEvent,
    ) -> UploaderResult<Option<ReadyObject>> {
        if !self.is_waiting_on(event.key()) {
            debug!(video_key = %event.key(), "Dropping event for an inactive session");
            return Ok(None);
        }

        match event {
            UploaderEvent::Channel { event, key } => match event {
                ChannelEvent::Message(message) => self.on_notification(message).await,
                ChannelEvent::Error(reason) => {
                    warn!(video_key = %key, reason = %reason, "Notification channel failed");
                    self.channel = None;
                    self.start_poll(&key);
                    Ok(None)
                }
                ChannelEvent::Closed => {
                    warn!(video_key = %key, "Notification channel closed before completion");
                    self.channel = None;
                    self.start_poll(&key);
                    Ok(None)
                }
            },
            UploaderEvent::PollReady { key, attempts } => {
                info!(video_key = %key, attempts, "Readiness poll succeeded");
                self.poll = None;
                self.transition(SessionStatus::Completed).await
            }
        }
    }

    /// Wait for the next inbox event and handle it.
    pub async fn next_event(&mut self) -> UploaderResult<Option<ReadyObject>> {
        let event = self
            .events_rx
            .recv()
            .await
            .ok_or_else(|| UploaderError::channel("event inbox closed"))?;
        self.handle_event(event).await
    }

    /// Drain the inbox until the current session completes.
    pub async fn wait_until_ready(&mut self) -> UploaderResult<ReadyObject> {
        loop {
            match self.session.as_ref() {
                None => return Err(UploaderError::NoSession),
                Some(s) if s.is_completed() => {
                    let url = self.read_url().await?;
                    return Ok(ReadyObject {
                        key: s.key().clone(),
                        url,
                    });
                }
                Some(s) if s.status() == SessionStatus::Failed => {
                    return Err(UploaderError::upload_failed(format!("session {} failed", s.key())));
                }
                Some(_) => {}
            }

            if let Some(ready) = self.next_event().await? {
                return Ok(ready);
            }
        }
    }

    /// Fresh read URL for the completed session.
    pub async fn read_url(&self) -> UploaderResult<String> {
        let session = self.session.as_ref().ok_or(UploaderError::NoSession)?;
        if !session.is_completed() {
            return Err(UploaderError::validation(format!(
                "session {} is {}, not completed",
                session.key(),
                session.status()
            )));
        }
        self.client.presign_get(session.key()).await
    }

    /// Forget everything: listeners, session, draft and the persisted key.
    pub fn reset(&mut self) -> UploaderResult<()> {
        self.teardown();
        self.session = None;
        self.draft.reset();
        self.store.clear()
    }

    /// Submit the draft to a point-only inference endpoint.
    ///
    /// On failure the draft is kept so the same points can be resubmitted.
    pub async fn submit_points(
        &mut self,
        endpoint: PointsEndpoint,
    ) -> UploaderResult<PathListResponse> {
        if self.draft.is_empty() {
            return Err(UploaderError::validation("add at least one point before submitting"));
        }
        let path = match endpoint {
            PointsEndpoint::Frame => self.config.paths.inference.clone(),
            PointsEndpoint::Frames => self.config.paths.inference_frames.clone(),
        };

        let result = self.client.submit_points(&path, self.draft.points()).await?;
        info!(points = self.draft.len(), endpoint = %path, "Segmentation submitted");
        self.draft.reset();
        Ok(result)
    }

    /// Segment the whole uploaded video using a reference image and the draft.
    pub async fn submit_video_segmentation(
        &mut self,
        image: UploadFile,
    ) -> UploaderResult<InferenceOutput> {
        let key = self
            .session
            .as_ref()
            .map(|s| s.key().clone())
            .ok_or(UploaderError::NoSession)?;
        if self.draft.is_empty() {
            return Err(UploaderError::validation("add at least one point before submitting"));
        }

        let output = self.client.submit_video(&image, &key, self.draft.points()).await?;
        info!(video_key = %key, points = self.draft.len(), "Video segmentation submitted");
        self.draft.reset();
        self.clear_persisted();
        Ok(output)
    }

    async fn transition(&mut self, next: SessionStatus) -> UploaderResult<Option<ReadyObject>> {
        let session = self.session.as_mut().ok_or(UploaderError::NoSession)?;
        let key = session.key().clone();

        match session.apply(next) {
            Transition::Ignored => {
                debug!(video_key = %key, status = %next, "Transition ignored");
                Ok(None)
            }
            Transition::Applied {
                to: SessionStatus::Completed,
                ..
            } => {
                self.teardown();
                self.clear_persisted();
                let url = self.client.presign_get(&key).await?;
                info!(video_key = %key, "Processed result ready");
                Ok(Some(ReadyObject { key, url }))
            }
            Transition::Applied {
                to: SessionStatus::Failed,
                ..
            } => {
                warn!(video_key = %key, "Backend reported failure");
                self.teardown();
                self.clear_persisted();
                Ok(None)
            }
            Transition::Applied { from, to } => {
                debug!(video_key = %key, from = %from, to = %to, "Session advanced");
                Ok(None)
            }
        }
    }

    async fn listen(&mut self, key: &CorrelationKey) {
        match self.connector.open(key, self.events_tx.clone()).await {
            Ok(handle) => self.channel = Some(handle),
            Err(e) => {
                warn!(
                    video_key = %key,
                    error = %e,
                    "Notification channel unavailable, polling instead"
                );
                self.start_poll(key);
            }
        }
    }

    fn start_poll(&mut self, key: &CorrelationKey) {
        if self.poll.is_some() {
            return;
        }
        let Some(uri) = self.config.readiness_uri(key) else {
            warn!(video_key = %key, "No readiness URI configured, cannot poll");
            return;
        };
        self.poll = Some(PollHandle::spawn(
            self.probe.clone(),
            key.clone(),
            uri,
            self.config.poll_interval,
            self.events_tx.clone(),
        ));
    }

    fn teardown(&mut self) {
        self.channel = None;
        self.poll = None;
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not clear persisted session");
        }
    }

    fn is_waiting_on(&self, key: &CorrelationKey) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_waiting() && s.key() == key)
    }
}
