//! Shared data models for the vdo upload workflow.
//!
//! This crate provides Serde-serializable types for:
//! - Correlation keys and their storage namespaces
//! - Upload session status
//! - Storage-completion events consumed by the relay
//! - Notification messages exchanged with the backend and the push channel
//! - Presigned credential responses
//! - Segmentation point payloads for the inference endpoints

pub mod key;
pub mod notification;
pub mod presign;
pub mod segmentation;
pub mod session;
pub mod storage_event;

// Re-export common types
pub use key::{CorrelationKey, KeyError, Namespace};
pub use notification::{ChannelHello, NotificationMessage, NotificationStatus};
pub use presign::PresignedUrl;
pub use segmentation::{PathListResponse, Point, PointLabel, SegmentationPoints};
pub use session::SessionStatus;
pub use storage_event::{StorageEvent, StorageObject};
