//! Persistence of the pending correlation key across restarts.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use vdo_models::CorrelationKey;

use crate::error::{UploaderError, UploaderResult};

/// What survives a restart: the key being waited on and when it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(rename = "videoKey")]
    pub video_key: CorrelationKey,

    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl PersistedSession {
    pub fn new(video_key: CorrelationKey) -> Self {
        Self {
            video_key,
            created_at: Utc::now(),
        }
    }

    /// Older than `ttl`. No ttl means never expired.
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => Utc::now() - self.created_at > ttl,
            Err(_) => false,
        }
    }
}

/// Client-side store for at most one pending session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> UploaderResult<Option<PersistedSession>>;
    fn save(&self, session: &PersistedSession) -> UploaderResult<()>;
    fn clear(&self) -> UploaderResult<()>;
}

/// JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> UploaderResult<Option<PersistedSession>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding unreadable session file"
                );
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> UploaderResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(session)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> UploaderResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Current contents, for inspection.
    pub fn current(&self) -> Option<PersistedSession> {
        self.inner.lock().ok().and_then(|guard| guard.clone())
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> UploaderResult<Option<PersistedSession>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| UploaderError::store("session store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, session: &PersistedSession) -> UploaderResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| UploaderError::store("session store lock poisoned"))?;
        *guard = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> UploaderResult<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| UploaderError::store("session store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
