//! Client-side upload workflow.
//!
//! This crate provides:
//! - The `Uploader` coordinator: upload → wait → ready, owned by one task
//! - The session state machine and its persisted correlation key
//! - Backend HTTP client (presigned credentials, raw PUT, inference)
//! - WebSocket notification channel with a fixed-interval poll fallback
//! - Segmentation point collection and submission

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod poll;
pub mod segmentation;
pub mod session;
pub mod store;
pub mod uploader;

pub use channel::{ChannelConnector, ChannelHandle, WsConnector};
pub use client::{BackendClient, WriteCredential};
pub use config::{parse_duration_secs, EndpointPaths, UploaderConfig};
pub use error::{UploaderError, UploaderResult};
pub use event::{ChannelEvent, UploaderEvent};
pub use poll::{poll_until_ready, PollHandle, PollOutcome, ReadinessProbe};
pub use segmentation::{InferenceOutput, PointsEndpoint, SegmentationDraft};
pub use session::{Transition, UploadSession};
pub use store::{FileSessionStore, MemorySessionStore, PersistedSession, SessionStore};
pub use uploader::{ReadyObject, UploadFile, Uploader};
