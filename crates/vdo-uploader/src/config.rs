//! Uploader configuration.

use std::path::PathBuf;
use std::time::Duration;

use vdo_models::CorrelationKey;

/// Backend endpoint paths, relative to `backend_url`.
#[derive(Debug, Clone)]
pub struct EndpointPaths {
    pub presign_put: String,
    pub presign_get: String,
    pub inference: String,
    pub inference_frames: String,
    pub inference_video: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            presign_put: "/presigned-put-url".to_string(),
            presign_get: "/presigned-get-url".to_string(),
            inference: "/inference".to_string(),
            inference_frames: "/inference-frames".to_string(),
            inference_video: "/inference-video".to_string(),
        }
    }
}

/// Uploader configuration.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Backend base URL (presign, inference)
    pub backend_url: String,
    /// Notification channel URL
    pub ws_url: String,
    /// Endpoint paths
    pub paths: EndpointPaths,
    /// Readiness URI for the poll fallback; `{key}` is replaced by the
    /// url-encoded correlation key. `None` disables the fallback.
    pub readiness_uri_template: Option<String>,
    /// Fixed interval between readiness checks
    pub poll_interval: Duration,
    /// Longest accepted video
    pub max_duration: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
    /// Persisted keys older than this are not resumed
    pub resume_ttl: Option<Duration>,
    /// Where the pending correlation key is persisted
    pub state_path: PathBuf,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws".to_string(),
            paths: EndpointPaths::default(),
            readiness_uri_template: Some("http://localhost:8000/ready?key={key}".to_string()),
            poll_interval: Duration::from_millis(2000),
            max_duration: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            resume_ttl: Some(Duration::from_secs(24 * 3600)),
            state_path: PathBuf::from(".vdo/session.json"),
        }
    }
}

impl UploaderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let backend_url = std::env::var("VDO_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:8000".to_string());
        let ws_url =
            std::env::var("VDO_BACKEND_WS_URL").unwrap_or_else(|_| derive_ws_url(&backend_url));

        // Empty string disables the poll fallback
        let readiness_uri_template = match std::env::var("VDO_READINESS_URI") {
            Ok(s) if s.trim().is_empty() => None,
            Ok(s) => Some(s),
            Err(_) => Some(format!("{}/ready?key={{key}}", backend_url.trim_end_matches('/'))),
        };

        Self {
            ws_url,
            readiness_uri_template,
            poll_interval: Duration::from_millis(
                std::env::var("VDO_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            max_duration: std::env::var("VDO_MAX_DURATION_SECS")
                .ok()
                .and_then(|s| parse_duration_secs(&s))
                .unwrap_or(Duration::from_secs(10)),
            request_timeout: Duration::from_secs(
                std::env::var("VDO_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            // 0 disables expiry
            resume_ttl: match std::env::var("VDO_RESUME_TTL_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => Some(Duration::from_secs(24 * 3600)),
            },
            state_path: std::env::var("VDO_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".vdo/session.json")),
            backend_url,
            paths: EndpointPaths::default(),
        }
    }

    /// Absolute URL for a backend path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.backend_url.trim_end_matches('/'), path)
    }

    /// Readiness URI for a key, if the poll fallback is configured.
    pub fn readiness_uri(&self, key: &CorrelationKey) -> Option<String> {
        self.readiness_uri_template
            .as_ref()
            .map(|template| template.replace("{key}", &urlencoding::encode(key.as_str())))
    }
}

/// Parse fractional seconds. Negative, NaN and infinite values are rejected.
pub fn parse_duration_secs(value: &str) -> Option<Duration> {
    let secs: f64 = value.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn derive_ws_url(backend_url: &str) -> String {
    let base = backend_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/ws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_uri_encodes_key() {
        let config = UploaderConfig::default();
        let key = CorrelationKey::from("videos/abc123");
        assert_eq!(
            config.readiness_uri(&key).as_deref(),
            Some("http://localhost:8000/ready?key=videos%2Fabc123")
        );

        let disabled = UploaderConfig {
            readiness_uri_template: None,
            ..UploaderConfig::default()
        };
        assert!(disabled.readiness_uri(&key).is_none());
    }

    #[test]
    fn test_parse_duration_secs_rejects_invalid_values() {
        assert_eq!(parse_duration_secs("4.9"), Some(Duration::from_millis(4900)));
        assert_eq!(parse_duration_secs(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration_secs("-1"), None);
        assert_eq!(parse_duration_secs("NaN"), None);
        assert_eq!(parse_duration_secs("inf"), None);
        assert_eq!(parse_duration_secs("ten"), None);
    }

    #[test]
    fn test_derive_ws_url() {
        assert_eq!(derive_ws_url("https://api.example.com/"), "wss://api.example.com/ws");
        assert_eq!(derive_ws_url("http://localhost:8000"), "ws://localhost:8000/ws");
    }
}
