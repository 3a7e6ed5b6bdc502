//! Cloudflare R2 storage client.
//!
//! This crate provides:
//! - Presigned PUT/GET URL generation for direct client transfers
//! - Object existence checks (readiness of derived artifacts)
//! - The `ObjectStore` seam used by the API, with an in-memory implementation

pub mod client;
pub mod error;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use store::{MemoryObjectStore, ObjectStore};
