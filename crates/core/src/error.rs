//! Error taxonomy for task orchestration.
//!
//! One enum covers the whole pipeline: configuration problems are caught
//! before a process is ever created, process failures carry their exit
//! code, and lifecycle misuse ([`TaskError::InvalidState`]) is returned to
//! the offending caller rather than recorded as a task failure.

/// Convenience alias used throughout the orchestration crates.
pub type TaskResult<T> = Result<T, TaskError>;

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A required stage parameter is missing. Raised during argument
    /// assembly, never after process creation.
    #[error("Missing configuration: {0}")]
    Configuration(String),

    /// The operating system could not create the external process.
    #[error("Failed to spawn process: {0}")]
    ProcessSpawn(#[source] std::io::Error),

    /// The external process exited with a nonzero code.
    #[error("Process exited with code {code}")]
    ProcessExit { code: i32 },

    /// A log, archive, or working-directory read/write failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An upload, download, or notification delivery failed.
    #[error("Network error: {0}")]
    Network(String),

    /// The operation is not legal in the task's current lifecycle state
    /// (e.g. double cancel, restart from a non-terminal state).
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl TaskError {
    /// Exit code placeholder for a process that was terminated by signal
    /// and therefore produced no code of its own.
    pub const TERMINATED: i32 = -1;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_exit_display_carries_code() {
        let err = TaskError::ProcessExit { code: 137 };
        assert_eq!(err.to_string(), "Process exited with code 137");
    }

    #[test]
    fn configuration_display_names_parameter() {
        let err = TaskError::Configuration("input".into());
        assert!(err.to_string().contains("input"));
    }

    #[test]
    fn io_error_converts() {
        fn failing() -> TaskResult<()> {
            Err(std::io::Error::other("disk on fire"))?;
            Ok(())
        }
        assert!(matches!(failing(), Err(TaskError::Io(_))));
    }
}
