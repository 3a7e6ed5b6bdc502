//! Client-side upload session.

use chrono::{DateTime, Utc};
use vdo_models::{CorrelationKey, SessionStatus};

/// Result of applying a status to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: SessionStatus, to: SessionStatus },
    Ignored,
}

/// One upload, from write credential to displayable result.
#[derive(Debug, Clone)]
pub struct UploadSession {
    key: CorrelationKey,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// New session right after the write credential was issued.
    pub fn new(key: CorrelationKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            status: SessionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Session restored from a persisted key; the upload itself already succeeded.
    pub fn resumed(key: CorrelationKey, created_at: DateTime<Utc>) -> Self {
        Self {
            key,
            status: SessionStatus::Uploaded,
            created_at,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> &CorrelationKey {
        &self.key
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Still waiting for a terminal status.
    pub fn is_waiting(&self) -> bool {
        !self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    /// Move to `next` if it is a forward step; repeats and regressions are ignored.
    pub fn apply(&mut self, next: SessionStatus) -> Transition {
        if !self.status.can_transition_to(next) {
            return Transition::Ignored;
        }
        let from = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Transition::Applied { from, to: next }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_applies_once() {
        let mut session = UploadSession::new(CorrelationKey::from("videos/abc123"));
        assert_eq!(
            session.apply(SessionStatus::Uploaded),
            Transition::Applied {
                from: SessionStatus::Pending,
                to: SessionStatus::Uploaded
            }
        );
        assert!(matches!(
            session.apply(SessionStatus::Completed),
            Transition::Applied { to: SessionStatus::Completed, .. }
        ));
        assert_eq!(session.apply(SessionStatus::Completed), Transition::Ignored);
        assert_eq!(session.apply(SessionStatus::Failed), Transition::Ignored);
        assert!(session.is_completed());
        assert!(!session.is_waiting());
    }

    #[test]
    fn test_no_regression() {
        let mut session = UploadSession::resumed(CorrelationKey::from("videos/abc123"), Utc::now());
        session.apply(SessionStatus::Processing);
        assert_eq!(session.apply(SessionStatus::Uploaded), Transition::Ignored);
        assert_eq!(session.status(), SessionStatus::Processing);

        assert!(matches!(session.apply(SessionStatus::Failed), Transition::Applied { .. }));
        assert!(!session.is_waiting());
    }
}
