//! Notification messages.
//!
//! The same `{ videoKey, status }` envelope travels two hops: from the relay
//! to the backend, and from the backend to the uploader over the push
//! channel. The server frame may also carry a human-readable `message`.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::CorrelationKey;
use crate::session::SessionStatus;

/// Status carried by a notification.
///
/// Unknown strings are kept verbatim instead of failing deserialization, so
/// a newer backend never breaks an older uploader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationStatus {
    Uploaded,
    Extracted,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl NotificationStatus {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationStatus::Uploaded => "uploaded",
            NotificationStatus::Extracted => "extracted",
            NotificationStatus::Processing => "processing",
            NotificationStatus::Completed => "completed",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Other(s) => s.as_str(),
        }
    }

    /// Session transition this status drives on the uploader, if any.
    pub fn session_status(&self) -> Option<SessionStatus> {
        match self {
            NotificationStatus::Uploaded => Some(SessionStatus::Uploaded),
            NotificationStatus::Extracted | NotificationStatus::Processing => {
                Some(SessionStatus::Processing)
            }
            NotificationStatus::Completed => Some(SessionStatus::Completed),
            NotificationStatus::Failed => Some(SessionStatus::Failed),
            NotificationStatus::Other(_) => None,
        }
    }
}

impl From<String> for NotificationStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "uploaded" => NotificationStatus::Uploaded,
            "extracted" => NotificationStatus::Extracted,
            "processing" => NotificationStatus::Processing,
            "completed" => NotificationStatus::Completed,
            "failed" => NotificationStatus::Failed,
            _ => NotificationStatus::Other(s),
        }
    }
}

impl From<NotificationStatus> for String {
    fn from(status: NotificationStatus) -> Self {
        match status {
            NotificationStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{ videoKey, status }` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotificationMessage {
    #[serde(rename = "videoKey")]
    pub video_key: CorrelationKey,

    #[schemars(with = "String")]
    pub status: NotificationStatus,

    /// Free-form description, only set on server frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NotificationMessage {
    pub fn new(video_key: impl Into<CorrelationKey>, status: NotificationStatus) -> Self {
        Self {
            video_key: video_key.into(),
            status,
            message: None,
        }
    }

    /// Raw upload landed in storage.
    pub fn uploaded(video_key: impl Into<CorrelationKey>) -> Self {
        Self::new(video_key, NotificationStatus::Uploaded)
    }

    /// Derived artifact landed in storage.
    pub fn extracted(video_key: impl Into<CorrelationKey>) -> Self {
        Self::new(video_key, NotificationStatus::Extracted)
    }

    /// Processing finished; the only status the uploader displays on.
    pub fn completed(video_key: impl Into<CorrelationKey>) -> Self {
        Self::new(video_key, NotificationStatus::Completed)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NotificationStatus::Completed
    }
}

/// First frame a client sends after the push channel opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChannelHello {
    #[serde(rename = "videoKey")]
    pub video_key: CorrelationKey,
}

impl ChannelHello {
    pub fn new(video_key: impl Into<CorrelationKey>) -> Self {
        Self {
            video_key: video_key.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_wire_shape() {
        let msg = NotificationMessage::uploaded("videos/abc123");
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"videoKey":"videos/abc123","status":"uploaded"}"#);
    }

    #[test]
    fn test_server_frame_with_message() {
        let frame =
            r#"{"message":"frame extraction","status":"completed","videoKey":"videos/abc123"}"#;
        let msg: NotificationMessage = serde_json::from_str(frame).unwrap();
        assert!(msg.is_completed());
        assert_eq!(msg.video_key.as_str(), "videos/abc123");
        assert_eq!(msg.message.as_deref(), Some("frame extraction"));
    }

    #[test]
    fn test_unknown_status_is_preserved() {
        let msg: NotificationMessage =
            serde_json::from_str(r#"{"videoKey":"videos/a","status":"queued"}"#).unwrap();
        assert_eq!(msg.status, NotificationStatus::Other("queued".into()));
        assert_eq!(msg.status.session_status(), None);

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"status\":\"queued\""));
    }

    #[test]
    fn test_status_maps_to_session_transition() {
        assert_eq!(
            NotificationStatus::Extracted.session_status(),
            Some(SessionStatus::Processing)
        );
        assert_eq!(
            NotificationStatus::Completed.session_status(),
            Some(SessionStatus::Completed)
        );
    }

    #[test]
    fn test_channel_hello_shape() {
        let hello = ChannelHello::new("videos/abc123");
        assert_eq!(
            serde_json::to_string(&hello).unwrap(),
            r#"{"videoKey":"videos/abc123"}"#
        );
    }
}
