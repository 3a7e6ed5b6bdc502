//! Presigned credential responses.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::CorrelationKey;

/// Response of `POST /presigned-put-url` and `POST /presigned-get-url`.
///
/// PUT responses always carry the freshly issued key; GET responses echo it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PresignedUrl {
    #[serde(rename = "presignedUrl")]
    pub presigned_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CorrelationKey>,
}

impl PresignedUrl {
    pub fn new(presigned_url: impl Into<String>, key: CorrelationKey) -> Self {
        Self {
            presigned_url: presigned_url.into(),
            key: Some(key),
        }
    }
}
