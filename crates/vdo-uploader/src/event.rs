//! Events delivered to the uploader inbox by channel and poll tasks.

use vdo_models::{CorrelationKey, NotificationMessage};

/// What a notification channel observed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(NotificationMessage),
    Error(String),
    Closed,
}

/// An inbox entry, tagged with the session key the producing task was started for.
#[derive(Debug, Clone, PartialEq)]
pub enum UploaderEvent {
    Channel { key: CorrelationKey, event: ChannelEvent },
    PollReady { key: CorrelationKey, attempts: u32 },
}

impl UploaderEvent {
    pub fn key(&self) -> &CorrelationKey {
        match self {
            Self::Channel { key, .. } | Self::PollReady { key, .. } => key,
        }
    }
}
