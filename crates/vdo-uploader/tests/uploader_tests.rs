//! Uploader workflow against a mocked backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use vdo_models::{
    CorrelationKey, NotificationMessage, NotificationStatus, PointLabel, SessionStatus,
};
use vdo_uploader::{
    BackendClient, ChannelConnector, ChannelEvent, ChannelHandle, InferenceOutput,
    MemorySessionStore, PersistedSession, PointsEndpoint, SessionStore, UploadFile, Uploader,
    UploaderConfig, UploaderError, UploaderEvent, UploaderResult,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "videos/abc123";

#[derive(Default)]
struct FakeState {
    refuse: bool,
    opened: Vec<CorrelationKey>,
    sender: Option<(CorrelationKey, mpsc::Sender<UploaderEvent>)>,
}

/// Records opened channels and lets the test push frames into them.
#[derive(Clone, Default)]
struct FakeConnector {
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnector {
    fn refusing() -> Self {
        let connector = Self::default();
        connector.state.lock().unwrap().refuse = true;
        connector
    }

    fn opened(&self) -> usize {
        self.state.lock().unwrap().opened.len()
    }

    async fn push(&self, event: ChannelEvent) {
        let (key, tx) = self.state.lock().unwrap().sender.clone().expect("no channel open");
        tx.send(UploaderEvent::Channel { key, event }).await.unwrap();
    }
}

#[async_trait]
impl ChannelConnector for FakeConnector {
    async fn open(
        &self,
        key: &CorrelationKey,
        events: mpsc::Sender<UploaderEvent>,
    ) -> UploaderResult<ChannelHandle> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(UploaderError::channel("connection refused"));
        }
        state.opened.push(key.clone());
        state.sender = Some((key.clone(), events));
        Ok(ChannelHandle::detached())
    }
}

fn config_for(server: &MockServer) -> UploaderConfig {
    UploaderConfig {
        backend_url: server.uri(),
        ws_url: "ws://unused/ws".to_string(),
        readiness_uri_template: Some(format!("{}/ready?key={{key}}", server.uri())),
        poll_interval: Duration::from_millis(50),
        ..UploaderConfig::default()
    }
}

fn uploader_for(
    server: &MockServer,
    store: MemorySessionStore,
    connector: FakeConnector,
) -> Uploader {
    let client = BackendClient::new(config_for(server)).unwrap();
    let probe = Arc::new(client.clone());
    Uploader::with_parts(client, Box::new(store), Arc::new(connector), probe)
}

fn short_video() -> UploadFile {
    UploadFile::new("clip.mp4", "video/mp4", vec![0u8; 1024])
        .with_duration(Duration::from_millis(4900))
}

async fn mount_presign_put(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/presigned-put-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "presignedUrl": format!("{}/bucket/{}", server.uri(), KEY),
            "key": KEY,
        })))
        .mount(server)
        .await;
}

async fn mount_put(server: &MockServer, status: u16) {
    Mock::given(method("PUT"))
        .and(path(format!("/bucket/{}", KEY)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

async fn mount_presign_get(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/presigned-get-url"))
        .and(query_param("key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "presignedUrl": "https://storage.example.com/read/abc123",
            "key": KEY,
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_duplicate_completion_is_applied_once() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;
    mount_presign_get(&server, 1).await;

    let store = MemorySessionStore::new();
    let connector = FakeConnector::default();
    let mut uploader = uploader_for(&server, store.clone(), connector.clone());

    let key = uploader.begin_upload(short_video()).await.unwrap();
    assert_eq!(key.as_str(), KEY);
    assert_eq!(uploader.status(), Some(SessionStatus::Uploaded));
    assert_eq!(connector.opened(), 1);
    assert_eq!(store.current().map(|s| s.video_key), Some(key.clone()));

    connector.push(ChannelEvent::Message(NotificationMessage::completed(KEY))).await;
    connector.push(ChannelEvent::Message(NotificationMessage::completed(KEY))).await;

    let ready = uploader.wait_until_ready().await.unwrap();
    assert_eq!(ready.key, key);
    assert_eq!(ready.url, "https://storage.example.com/read/abc123");

    // The queued duplicate and a direct repeat both do nothing
    assert_eq!(uploader.next_event().await.unwrap(), None);
    assert_eq!(
        uploader.on_notification(NotificationMessage::completed(KEY)).await.unwrap(),
        None
    );

    assert_eq!(uploader.status(), Some(SessionStatus::Completed));
    assert!(!uploader.is_listening());
    assert!(store.current().is_none());
}

#[tokio::test]
async fn test_notification_for_other_key_is_ignored() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;
    mount_presign_get(&server, 0).await;

    let mut uploader = uploader_for(&server, MemorySessionStore::new(), FakeConnector::default());
    uploader.begin_upload(short_video()).await.unwrap();

    let stranger = NotificationMessage::completed("videos/someone-else");
    assert_eq!(uploader.on_notification(stranger).await.unwrap(), None);

    let unknown_status =
        NotificationMessage::new(KEY, NotificationStatus::Other("queued".to_string()));
    assert_eq!(uploader.on_notification(unknown_status).await.unwrap(), None);

    assert_eq!(uploader.status(), Some(SessionStatus::Uploaded));
    assert!(uploader.is_listening());
}

#[tokio::test]
async fn test_failed_put_abandons_session() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 500).await;

    let store = MemorySessionStore::new();
    let mut uploader = uploader_for(&server, store.clone(), FakeConnector::default());

    let err = uploader.begin_upload(short_video()).await.unwrap_err();
    assert!(matches!(err, UploaderError::UploadFailed(_)), "got {err:?}");
    assert_eq!(uploader.status(), Some(SessionStatus::Failed));
    assert!(!uploader.is_listening());
    assert!(store.current().is_none());

    // A failed session does not block a new attempt
    let err = uploader.begin_upload(short_video()).await.unwrap_err();
    assert!(matches!(err, UploaderError::UploadFailed(_)));
}

#[tokio::test]
async fn test_second_upload_rejected_while_pending() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;

    let mut uploader = uploader_for(&server, MemorySessionStore::new(), FakeConnector::default());
    uploader.begin_upload(short_video()).await.unwrap();

    let err = uploader.begin_upload(short_video()).await.unwrap_err();
    assert!(matches!(err, UploaderError::SessionPending(ref key) if key.as_str() == KEY));
}

#[tokio::test]
async fn test_credential_failure_creates_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/presigned-put-url"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(serde_json::json!({"error": "r2 down"})),
        )
        .mount(&server)
        .await;

    let connector = FakeConnector::default();
    let mut uploader = uploader_for(&server, MemorySessionStore::new(), connector.clone());

    let err = uploader.begin_upload(short_video()).await.unwrap_err();
    match err {
        UploaderError::CredentialUnavailable(reason) => assert!(reason.contains("r2 down")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(uploader.session().is_none());
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_too_long_video_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/presigned-put-url"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut uploader = uploader_for(&server, MemorySessionStore::new(), FakeConnector::default());
    let long = UploadFile::new("long.mp4", "video/mp4", vec![1u8; 16])
        .with_duration(Duration::from_secs_f64(10.5));

    let err = uploader.begin_upload(long).await.unwrap_err();
    assert!(matches!(err, UploaderError::Validation(_)));
    assert!(uploader.session().is_none());
}

#[tokio::test]
async fn test_resume_is_idempotent() {
    let server = MockServer::start().await;
    let store = MemorySessionStore::with_session(PersistedSession::new(CorrelationKey::from(KEY)));
    let connector = FakeConnector::default();
    let mut uploader = uploader_for(&server, store, connector.clone());

    let first = uploader.resume_if_pending().await.unwrap();
    let second = uploader.resume_if_pending().await.unwrap();

    assert_eq!(first, Some(CorrelationKey::from(KEY)));
    assert_eq!(second, first);
    assert_eq!(connector.opened(), 1);
    assert_eq!(uploader.status(), Some(SessionStatus::Uploaded));
}

#[tokio::test]
async fn test_expired_session_is_not_resumed() {
    let server = MockServer::start().await;
    let mut stale = PersistedSession::new(CorrelationKey::from(KEY));
    stale.created_at = chrono::Utc::now() - chrono::Duration::days(2);
    let store = MemorySessionStore::with_session(stale);
    let connector = FakeConnector::default();
    let mut uploader = uploader_for(&server, store.clone(), connector.clone());

    assert_eq!(uploader.resume_if_pending().await.unwrap(), None);
    assert!(store.load().unwrap().is_none());
    assert_eq!(connector.opened(), 0);
}

#[tokio::test]
async fn test_poll_fallback_when_channel_refused() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;
    mount_presign_get(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path("/ready"))
        .and(query_param("key", KEY))
        .respond_with(ResponseTemplate::new(404))
        .up_to_n_times(3)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut uploader = uploader_for(&server, MemorySessionStore::new(), FakeConnector::refusing());
    uploader.begin_upload(short_video()).await.unwrap();
    assert!(uploader.is_listening());

    let ready = tokio::time::timeout(Duration::from_secs(5), uploader.wait_until_ready())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.key.as_str(), KEY);

    let heads = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.to_string() == "HEAD")
        .count();
    assert_eq!(heads, 4);
}

#[tokio::test]
async fn test_channel_error_switches_to_poll() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;
    mount_presign_get(&server, 1).await;
    Mock::given(method("HEAD"))
        .and(path("/ready"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let connector = FakeConnector::default();
    let mut uploader = uploader_for(&server, MemorySessionStore::new(), connector.clone());
    uploader.begin_upload(short_video()).await.unwrap();

    connector.push(ChannelEvent::Error("connection reset".to_string())).await;
    let ready = tokio::time::timeout(Duration::from_secs(5), uploader.wait_until_ready())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ready.url, "https://storage.example.com/read/abc123");
    assert!(!uploader.is_listening());
}

#[tokio::test]
async fn test_failed_inference_keeps_points() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(
            ResponseTemplate::new(500)
                .set_body_json(serde_json::json!({"error": "model not loaded"})),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inference"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "segmented_image_path": "segmented/frame-0.png"
        })))
        .with_priority(2)
        .mount(&server)
        .await;

    let mut uploader = uploader_for(&server, MemorySessionStore::new(), FakeConnector::default());
    let err = uploader.submit_points(PointsEndpoint::Frame).await.unwrap_err();
    assert!(matches!(err, UploaderError::Validation(_)));

    uploader.draft_mut().add_point(120.0, 64.5, PointLabel::Include);
    uploader.draft_mut().add_point(10.0, 10.0, PointLabel::Exclude);

    match uploader.submit_points(PointsEndpoint::Frame).await.unwrap_err() {
        UploaderError::InferenceFailed(reason) => assert!(reason.contains("model not loaded")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(uploader.draft().len(), 2);

    let result = uploader.submit_points(PointsEndpoint::Frame).await.unwrap();
    assert_eq!(result.segmented_image_path.as_deref(), Some("segmented/frame-0.png"));
    assert!(uploader.draft().is_empty());
}

#[tokio::test]
async fn test_video_segmentation_returns_stream() {
    let server = MockServer::start().await;
    mount_presign_put(&server).await;
    mount_put(&server, 200).await;
    Mock::given(method("POST"))
        .and(path("/inference-video"))
        .and(header("accept", "video/mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(vec![0x00, 0x00, 0x00, 0x18, 0x66, 0x74, 0x79, 0x70]),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = MemorySessionStore::new();
    let mut uploader = uploader_for(&server, store.clone(), FakeConnector::default());
    uploader.begin_upload(short_video()).await.unwrap();
    uploader.draft_mut().add_point(5.0, 5.0, PointLabel::Include);

    let image = UploadFile::new("frame.png", "image/png", vec![0x89, 0x50, 0x4e, 0x47]);
    let output = uploader.submit_video_segmentation(image).await.unwrap();

    assert_eq!(
        output,
        InferenceOutput::Video(vec![0x00, 0x00, 0x00, 0x18, 0x66, 0x74, 0x79, 0x70])
    );
    assert!(uploader.draft().is_empty());
    assert!(store.current().is_none());
}
