//! Storage event classification.

use std::fmt;

use vdo_models::{Namespace, NotificationStatus, StorageEvent};

/// What a queue message turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A raw video landed under `videos/`
    RawUpload,
    /// The backend wrote a derived artifact under `frames/`
    DerivedArtifact,
    /// Key outside every known namespace
    Unrecognized,
    /// Key belongs to another environment
    OtherEnvironment,
    /// Body is not a storage event
    Undecodable,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RawUpload => "raw_upload",
            EventKind::DerivedArtifact => "derived_artifact",
            EventKind::Unrecognized => "unrecognized",
            EventKind::OtherEnvironment => "other_environment",
            EventKind::Undecodable => "undecodable",
        }
    }

    /// Status to relay for this kind, if it is relayed at all.
    pub fn relay_status(&self) -> Option<NotificationStatus> {
        match self {
            EventKind::RawUpload => Some(NotificationStatus::Uploaded),
            EventKind::DerivedArtifact => Some(NotificationStatus::Extracted),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an event by key namespace.
///
/// With a `key_marker`, keys that do not contain it are treated as another
/// environment's traffic, whatever their namespace.
pub fn classify(event: &StorageEvent, key_marker: Option<&str>) -> EventKind {
    if let Some(marker) = key_marker {
        if !event.key().contains(marker) {
            return EventKind::OtherEnvironment;
        }
    }
    match event.namespace() {
        Some(Namespace::Videos) => EventKind::RawUpload,
        Some(Namespace::Frames) => EventKind::DerivedArtifact,
        None => EventKind::Unrecognized,
    }
}
