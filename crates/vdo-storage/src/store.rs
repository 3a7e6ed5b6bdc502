//! Object store seam.
//!
//! The API only needs three things from storage: a write credential, a read
//! credential, and an existence check. `R2Client` provides them against
//! Cloudflare R2; `MemoryObjectStore` provides them in-process for local runs
//! and tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::client::{validate_key, R2Client};
use crate::error::StorageResult;

/// Credential issuance and readiness checks against an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presigned URL authorizing a single PUT of `key`.
    async fn presign_put(&self, key: &str) -> StorageResult<String>;

    /// Presigned URL authorizing reads of `key`.
    async fn presign_get(&self, key: &str) -> StorageResult<String>;

    /// Whether `key` has been written.
    async fn exists(&self, key: &str) -> StorageResult<bool>;
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn presign_put(&self, key: &str) -> StorageResult<String> {
        R2Client::presign_put(self, key).await
    }

    async fn presign_get(&self, key: &str) -> StorageResult<String> {
        R2Client::presign_get(self, key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        R2Client::exists(self, key).await
    }
}

/// In-process object store.
///
/// URLs are `<base_url>/put/<key>` and `<base_url>/get/<key>`; objects exist
/// once `mark_written` is called for them.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    base_url: String,
    written: Arc<RwLock<HashSet<String>>>,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            written: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Record that an object has been written.
    pub async fn mark_written(&self, key: &str) {
        self.written.write().await.insert(key.to_string());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("{}/put/{}", self.base_url, key))
    }

    async fn presign_get(&self, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(format!("{}/get/{}", self.base_url, key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.written.read().await.contains(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_urls() {
        let store = MemoryObjectStore::new("https://store/");
        assert_eq!(
            store.presign_get("videos/x").await.unwrap(),
            "https://store/get/videos/x"
        );
        assert_eq!(
            store.presign_put("videos/x").await.unwrap(),
            "https://store/put/videos/x"
        );
    }

    #[tokio::test]
    async fn test_memory_store_exists_after_write() {
        let store = MemoryObjectStore::new("https://store");
        assert!(!store.exists("frames/x.zip").await.unwrap());
        store.mark_written("frames/x.zip").await;
        assert!(store.exists("frames/x.zip").await.unwrap());
    }
}
