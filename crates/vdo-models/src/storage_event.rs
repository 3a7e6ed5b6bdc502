//! Storage-completion events.
//!
//! Shape of an object-store event notification as delivered by the queue:
//! `{ "object": { "key": "videos/abc123", "size": 1024, "eTag": "..." }, ... }`.
//! Only `object.key` is required; everything else is optional metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::{CorrelationKey, Namespace};

/// The object a storage event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageObject {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, rename = "eTag", skip_serializing_if = "Option::is_none")]
    pub e_tag: Option<String>,
}

/// One completed object write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageEvent {
    pub object: StorageObject,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(default, rename = "eventTime", skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
}

impl StorageEvent {
    /// Build a minimal event for an object key.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            object: StorageObject {
                key: key.into(),
                size: None,
                e_tag: None,
            },
            action: None,
            bucket: None,
            event_time: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.object.key
    }

    pub fn namespace(&self) -> Option<Namespace> {
        Namespace::of_key(&self.object.key)
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::from(self.object.key.as_str())
    }
}
