use std::path::PathBuf;
use thiserror::Error;

use crate::types::JobType;

/// Errors from the status store itself. These are hard failures: losing the
/// persisted cursor would corrupt resumption, so callers never swallow them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error accessing job status at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt job status record at {path}: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Failed to lock job status at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons an Initiate call is rejected. None of them leaves a job behind.
#[derive(Debug, Error)]
pub enum InitiateError {
    #[error("Another job is already running{}", .job_id.as_deref().map(|id| format!(" ({id})")).unwrap_or_default())]
    AlreadyRunning { job_id: Option<String> },

    #[error("Unrecognized file format: header [{}] matches no known layout", .columns.join(", "))]
    UnrecognizedFormat { columns: Vec<String> },

    #[error("File looks like a {detected} file, but a {expected} file was expected")]
    TypeMismatch { detected: JobType, expected: JobType },

    #[error("No handler is configured for {0} jobs")]
    Unsupported(JobType),

    #[error("Empty file: {reason}")]
    EmptyArtifact { reason: String },

    #[error("IO error staging {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InitiateError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for rejections caused by the submitted file rather than the host.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedFormat { .. }
                | Self::TypeMismatch { .. }
                | Self::EmptyArtifact { .. }
                | Self::Malformed { .. }
        )
    }
}

/// Category of a per-unit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitErrorKind {
    DuplicateKey,
    UnresolvedReference,
    InvalidValue,
    MissingColumns,
    MissingAsset,
    Upload,
}

/// A failure isolated to one unit. It is logged and counted in `failed`;
/// the surrounding batch still commits and the job continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UnitError {
    pub kind: UnitErrorKind,
    pub message: String,
}

impl UnitError {
    pub fn new(kind: UnitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(UnitErrorKind::DuplicateKey, message)
    }

    pub fn unresolved(message: impl Into<String>) -> Self {
        Self::new(UnitErrorKind::UnresolvedReference, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(UnitErrorKind::InvalidValue, message)
    }

    pub fn missing_columns(expected: usize, found: usize) -> Self {
        Self::new(
            UnitErrorKind::MissingColumns,
            format!("expected {expected} columns, found {found}"),
        )
    }
}

/// A failure of the batch as a whole. Rolls back the batch transaction and
/// drives the job to terminal `error`.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Staged file {path} is missing: {source}")]
    ArtifactLost {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read staged file {path}: {message}")]
    ArtifactRead { path: PathBuf, message: String },

    #[error("Job record has no cursor or staged file while running")]
    MissingCursor,

    #[error("No handler registered for {0} jobs")]
    NoHandler(JobType),

    #[error("Batch aborted: {0}")]
    Sink(String),

    #[error("Worker task failed: {0}")]
    Join(String),
}

impl BatchError {
    pub fn sink(err: impl std::fmt::Display) -> Self {
        Self::Sink(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_names_both_types() {
        let err = InitiateError::TypeMismatch {
            detected: JobType::Orders,
            expected: JobType::Products,
        };
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("products"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_already_running_mentions_job_id() {
        let err = InitiateError::AlreadyRunning {
            job_id: Some("abc".into()),
        };
        assert_eq!(err.to_string(), "Another job is already running (abc)");
        let err = InitiateError::AlreadyRunning { job_id: None };
        assert_eq!(err.to_string(), "Another job is already running");
        assert!(!err.is_validation());
    }

    #[test]
    fn test_unrecognized_format_lists_columns() {
        let err = InitiateError::UnrecognizedFormat {
            columns: vec!["a".into(), "b".into()],
        };
        assert!(err.to_string().contains("[a, b]"));
    }

    #[test]
    fn test_unit_error_display_is_message() {
        let err = UnitError::missing_columns(4, 3);
        assert_eq!(err.kind, UnitErrorKind::MissingColumns);
        assert_eq!(err.to_string(), "expected 4 columns, found 3");
    }

    #[test]
    fn test_batch_error_artifact_lost_mentions_path() {
        let err = BatchError::ArtifactLost {
            path: PathBuf::from("/data/staging/job.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/data/staging/job.csv"));
    }
}
