//! Upload session status.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle of an upload session on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Write credential issued, upload not finished
    #[default]
    Pending,
    /// Raw object written to storage
    Uploaded,
    /// Backend is deriving artifacts
    Processing,
    /// Processed result is available
    Completed,
    /// Session abandoned
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Uploaded => "uploaded",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Pending => 0,
            SessionStatus::Uploaded => 1,
            SessionStatus::Processing => 2,
            SessionStatus::Completed | SessionStatus::Failed => 3,
        }
    }

    /// Whether moving from `self` to `next` changes anything.
    ///
    /// Progress only moves forward; terminal states absorb everything,
    /// including a repeat of themselves.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SessionStatus::Failed => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SessionStatus::Pending),
            "uploaded" => Ok(SessionStatus::Uploaded),
            "processing" => Ok(SessionStatus::Processing),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Uploaded));
        assert!(SessionStatus::Uploaded.can_transition_to(SessionStatus::Processing));
        assert!(SessionStatus::Uploaded.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Pending.can_transition_to(SessionStatus::Failed));
    }

    #[test]
    fn test_regressions_and_repeats_rejected() {
        assert!(!SessionStatus::Processing.can_transition_to(SessionStatus::Uploaded));
        assert!(!SessionStatus::Uploaded.can_transition_to(SessionStatus::Uploaded));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Failed));
        assert!(!SessionStatus::Failed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("Completed".parse::<SessionStatus>().unwrap(), SessionStatus::Completed);
        assert!("bogus".parse::<SessionStatus>().is_err());
    }
}
