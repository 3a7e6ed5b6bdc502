//! Application state.

use std::sync::Arc;

use vdo_storage::{ObjectStore, R2Client};

use crate::config::ApiConfig;
use crate::hub::NotificationHub;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub hub: Arc<NotificationHub>,
}

impl AppState {
    /// Create state backed by R2 from the environment.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let storage = R2Client::from_env()?;
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    /// Create state over any object store.
    pub fn with_storage(config: ApiConfig, storage: Arc<dyn ObjectStore>) -> Self {
        let hub = Arc::new(NotificationHub::new(config.hub_ttl));
        Self { config, storage, hub }
    }
}
