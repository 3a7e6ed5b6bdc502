//! Relay configuration.

use std::time::Duration;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Backend base URL
    pub backend_url: String,
    /// Path notified for raw uploads
    pub upload_complete_path: String,
    /// Path notified for derived artifacts
    pub frames_complete_path: String,
    /// Only keys containing this marker are relayed (environment isolation)
    pub key_marker: Option<String>,
    /// Backend request timeout
    pub request_timeout: Duration,
    /// Messages read per batch
    pub batch_size: usize,
    /// How long a read blocks waiting for messages
    pub block_ms: u64,
    /// How often retried messages are reclaimed
    pub claim_interval: Duration,
    /// How long a message stays pending before it is redelivered
    pub retry_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            upload_complete_path: "/video-upload-complete".to_string(),
            frames_complete_path: "/frames-extraction-complete".to_string(),
            key_marker: None,
            request_timeout: Duration::from_secs(30),
            batch_size: 10,
            block_ms: 1000,
            claim_interval: Duration::from_secs(15),
            retry_delay: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: std::env::var("BACKEND_URL").unwrap_or(defaults.backend_url),
            upload_complete_path: std::env::var("RELAY_UPLOAD_COMPLETE_PATH")
                .unwrap_or(defaults.upload_complete_path),
            frames_complete_path: std::env::var("RELAY_FRAMES_COMPLETE_PATH")
                .unwrap_or(defaults.frames_complete_path),
            key_marker: std::env::var("RELAY_KEY_MARKER").ok().filter(|s| !s.trim().is_empty()),
            request_timeout: Duration::from_secs(
                std::env::var("RELAY_REQUEST_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            batch_size: std::env::var("RELAY_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_size),
            block_ms: std::env::var("RELAY_BLOCK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.block_ms),
            claim_interval: Duration::from_secs(
                std::env::var("RELAY_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            retry_delay: Duration::from_secs(
                std::env::var("RELAY_RETRY_DELAY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.backend_url.trim_end_matches('/'), path)
    }
}
