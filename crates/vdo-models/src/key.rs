//! Correlation keys and storage namespaces.
//!
//! A correlation key is the object-store key issued together with the write
//! credential (`videos/video-<uuid>`). It ties the raw upload to every derived
//! artifact (`frames/video-<uuid>.zip`) and to the notifications the backend
//! pushes back to the uploader.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced when interpreting a correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("Correlation key is empty")]
    Empty,

    #[error("Key has no recognized namespace: {0}")]
    UnknownNamespace(String),

    #[error("Key has no object name after its namespace: {0}")]
    MissingObjectName(String),
}

/// Leading path segment of a storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Raw uploads written through a presigned PUT.
    Videos,
    /// Artifacts derived from a raw upload by the backend.
    Frames,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Videos, Namespace::Frames];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Videos => "videos",
            Namespace::Frames => "frames",
        }
    }

    /// Key prefix including the trailing slash.
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Videos => "videos/",
            Namespace::Frames => "frames/",
        }
    }

    /// Classify a raw key by its prefix.
    pub fn of_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ns| key.starts_with(ns.prefix()))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque identifier tying an upload to its processed result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct CorrelationKey(pub String);

impl CorrelationKey {
    /// Generate a fresh raw-upload key, optionally tagged with an environment
    /// marker (`videos/video-<uuid>-DEV`).
    pub fn generate(env_marker: Option<&str>) -> Self {
        let mut key = format!("{}video-{}", Namespace::Videos.prefix(), Uuid::new_v4());
        if let Some(marker) = env_marker.filter(|m| !m.is_empty()) {
            key.push('-');
            key.push_str(marker);
        }
        Self(key)
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parse a key received from the outside world, rejecting blanks.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> Option<Namespace> {
        Namespace::of_key(&self.0)
    }

    /// The path segment right after the namespace prefix.
    pub fn object_name(&self) -> Option<&str> {
        let (_, rest) = self.0.split_once('/')?;
        let name = rest.split('/').next().unwrap_or_default();
        (!name.is_empty()).then_some(name)
    }

    /// Map any key in a known namespace back to the raw-upload key it was
    /// derived from. `frames/video-1.zip` becomes `videos/video-1`.
    pub fn video_key(&self) -> Result<CorrelationKey, KeyError> {
        let namespace = self
            .namespace()
            .ok_or_else(|| KeyError::UnknownNamespace(self.0.clone()))?;
        let name = self
            .object_name()
            .ok_or_else(|| KeyError::MissingObjectName(self.0.clone()))?;

        match namespace {
            Namespace::Videos => Ok(Self(format!("{}{}", Namespace::Videos.prefix(), name))),
            Namespace::Frames => {
                let stem = name.strip_suffix(".zip").unwrap_or(name);
                Ok(Self(format!("{}{}", Namespace::Videos.prefix(), stem)))
            }
        }
    }

    /// Key of the frames archive the backend derives from this upload.
    pub fn frames_key(&self) -> Result<CorrelationKey, KeyError> {
        let video = self.video_key()?;
        let name = video
            .object_name()
            .ok_or_else(|| KeyError::MissingObjectName(self.0.clone()))?;
        Ok(Self(format!("{}{}.zip", Namespace::Frames.prefix(), name)))
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for CorrelationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_uses_videos_namespace() {
        let key = CorrelationKey::generate(None);
        assert!(key.as_str().starts_with("videos/video-"));
        assert_eq!(key.namespace(), Some(Namespace::Videos));
    }

    #[test]
    fn test_generate_with_env_marker() {
        let key = CorrelationKey::generate(Some("DEV"));
        assert!(key.as_str().ends_with("-DEV"));

        let key = CorrelationKey::generate(Some(""));
        assert!(!key.as_str().ends_with('-'));
    }

    #[test]
    fn test_namespace_classification() {
        assert_eq!(Namespace::of_key("videos/abc123"), Some(Namespace::Videos));
        assert_eq!(Namespace::of_key("frames/abc123.zip"), Some(Namespace::Frames));
        assert_eq!(Namespace::of_key("unrelated/abc"), None);
        // Prefix match only, not substring
        assert_eq!(Namespace::of_key("backup/videos/abc"), None);
    }

    #[test]
    fn test_video_key_from_frames_archive() {
        let key = CorrelationKey::from("frames/video-42.zip");
        assert_eq!(key.object_name(), Some("video-42.zip"));
        assert_eq!(key.video_key().unwrap().as_str(), "videos/video-42");
    }

    #[test]
    fn test_frames_key_points_at_archive() {
        let key = CorrelationKey::from("videos/abc123");
        assert_eq!(key.frames_key().unwrap().as_str(), "frames/abc123.zip");
        assert_eq!(key.frames_key().unwrap().video_key().unwrap(), key);
    }

    #[test]
    fn test_dotted_names_survive_frames_round_trip() {
        for raw in ["videos/video-1-v1.2", "videos/clip.mp4"] {
            let key = CorrelationKey::from(raw);
            let frames = key.frames_key().unwrap();
            assert_eq!(frames.as_str(), format!("frames/{}.zip", key.object_name().unwrap()));
            assert_eq!(frames.video_key().unwrap(), key);
        }
    }

    #[test]
    fn test_video_key_is_identity_for_raw_uploads() {
        let key = CorrelationKey::from("videos/abc123");
        assert_eq!(key.video_key().unwrap(), key);
    }

    #[test]
    fn test_video_key_errors() {
        assert_eq!(
            CorrelationKey::from("other/x").video_key(),
            Err(KeyError::UnknownNamespace("other/x".into()))
        );
        assert_eq!(
            CorrelationKey::from("frames/").video_key(),
            Err(KeyError::MissingObjectName("frames/".into()))
        );
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert_eq!(CorrelationKey::parse("  "), Err(KeyError::Empty));
        assert_eq!(CorrelationKey::parse(" videos/a ").unwrap().as_str(), "videos/a");
    }

    #[test]
    fn test_serializes_transparently() {
        let key = CorrelationKey::from("videos/abc123");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"videos/abc123\"");
    }
}
