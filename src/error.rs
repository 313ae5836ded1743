use std::path::PathBuf;

use thiserror::Error;

use crate::state_machine::{InvalidTransition, JobState};

/// Failures of the job store. Everything except `PreconditionConflict` and
/// `NotFound` means the store itself is unusable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {id} was expected in state {expected} but is {actual}")]
    PreconditionConflict {
        id: String,
        expected: JobState,
        actual: JobState,
    },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("corrupt job record: {0}")]
    Corrupt(String),

    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::PreconditionConflict { .. })
    }
}

/// The source media could not be turned into a local artifact.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("acquisition tool not found: {0}")]
    ToolNotFound(String),

    #[error("acquisition tool exited with {status}: {message}")]
    ToolFailed { status: String, message: String },

    #[error("acquisition timed out after {0}s")]
    TimedOut(u64),

    #[error("source returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("no artifact found at {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The destination platform did not accept the artifact.
#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("artifact missing before upload: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("upload quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("upload rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("destination unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Conditions that abort a whole cycle rather than a single job.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a queue cycle is already running")]
    CycleInProgress,

    #[error("the queue is held by {owner}")]
    QueueBusy { owner: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures of operator actions (enqueue, requeue, recover).
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("source reference must not be empty")]
    EmptySource,

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("the queue is held by {owner}; stop it before recovering")]
    QueueBusy { owner: String },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("daily_limit must be a positive integer, got {0}")]
    InvalidDailyLimit(String),

    #[error("interval_minutes must be at least 1")]
    InvalidInterval,

    #[error("cleanup.attempts must be between 1 and 10, got {0}")]
    InvalidCleanupAttempts(u32),

    #[error("missing publication credential: {0}")]
    MissingCredential(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_display_names_both_states() {
        let err = StoreError::PreconditionConflict {
            id: "abc".into(),
            expected: JobState::Pending,
            actual: JobState::Acquiring,
        };
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "job abc was expected in state pending but is acquiring"
        );
        assert!(!StoreError::NotFound("abc".into()).is_conflict());
    }

    #[test]
    fn engine_error_is_transparent_over_store() {
        let err = EngineError::from(StoreError::Unavailable("disk gone".into()));
        assert_eq!(err.to_string(), "job store unavailable: disk gone");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
        assert_send_sync::<AcquisitionError>();
        assert_send_sync::<PublicationError>();
        assert_send_sync::<EngineError>();
    }
}
