//! Task status codes and the lifecycle transition table.
//!
//! The state machine is small and closed:
//!
//! ```text
//! Queued ──> Running ──> Completed | Failed | Canceled
//!    └──────────────────────────────────────────^
//! ```
//!
//! Completed, Failed, and Canceled are terminal. Canceled is additionally
//! reachable straight from Queued. The predicates here are pure; enforcing
//! them is the task lifecycle's job.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;

// ---------------------------------------------------------------------------
// StatusCode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl StatusCode {
    /// Wire-format string for this variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Parse from a wire-format string.
    pub fn from_str(s: &str) -> Result<Self, TaskError> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(TaskError::Configuration(format!(
                "Invalid status code: '{s}'. Must be one of: queued, running, completed, \
                 failed, canceled"
            ))),
        }
    }

    /// Terminal states admit no transition except via `restart()`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: StatusCode) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            (Self::Queued, Self::Canceled) => true,
            (Self::Running, Self::Completed) => true,
            (Self::Running, Self::Failed) => true,
            (Self::Running, Self::Canceled) => true,
            // restart() resets terminal states back to Queued.
            (s, Self::Queued) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// A status code plus the optional error message that drove it there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub code: StatusCode,
    /// Populated only when `code` is [`StatusCode::Failed`].
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_message: Option<String>,
}

impl TaskStatus {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Failed,
            error_message: Some(message.into()),
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new(StatusCode::Queued)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
