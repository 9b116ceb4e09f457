//! Error taxonomy for target configuration.
//!
//! Target-local failures (precondition, not-found, parse, validation) are surfaced as
//! [`StitchError`] values and converted into per-target outcome entries by the
//! orchestrator. Timeouts are synthesized by the orchestrator itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

/// Stable classification of a [`StitchError`], used by outcome records and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Precondition,
    NotFound,
    Parse,
    Validation,
    Timeout,
    LockContention,
    RollbackFailure,
    UnknownTarget,
    InvalidSpec,
    BridgeInstall,
    Io,
    Serialize,
    TaskFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum StitchError {
    /// The transport/command/endpoint combination is not acceptable for a target.
    #[error("{target}: {message}")]
    Precondition { target: String, message: String },

    #[error("Server '{id}' not found in {}", .path.display())]
    NotFound { id: String, path: PathBuf },

    #[error("Failed to parse {format} config {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    /// Post-write shape check failed.
    #[error("Validation of {} failed: {message}", .path.display())]
    Validation { path: PathBuf, message: String },

    #[error("{target}: {operation} timed out after {}ms{}", .after.as_millis(), late_write_note(.late_write))]
    Timeout {
        target: String,
        operation: &'static str,
        after: Duration,
        /// The abandoned call can still write its change once it finishes.
        late_write: bool,
    },

    #[error("Lock {} is already held (holder pid: {})", .path.display(), display_holder(.holder))]
    LockContention { path: PathBuf, holder: Option<u32> },

    /// Restoring the pre-write state failed after a validation failure.
    #[error("{validation}; restoring {} also failed: {rollback}", .path.display())]
    RollbackFailure {
        path: PathBuf,
        validation: String,
        rollback: String,
    },

    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    #[error("Invalid server spec: {0}")]
    InvalidSpec(String),

    #[error("Failed to install bridge {package}@{version}: {message}")]
    BridgeInstall {
        package: String,
        version: String,
        message: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {format} config: {message}")]
    Serialize {
        format: &'static str,
        message: String,
    },

    #[error("{target}: {operation} task failed: {message}")]
    TaskFailed {
        target: String,
        operation: &'static str,
        message: String,
    },
}

impl StitchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StitchError::Precondition { .. } => ErrorKind::Precondition,
            StitchError::NotFound { .. } => ErrorKind::NotFound,
            StitchError::Parse { .. } => ErrorKind::Parse,
            StitchError::Validation { .. } => ErrorKind::Validation,
            StitchError::Timeout { .. } => ErrorKind::Timeout,
            StitchError::LockContention { .. } => ErrorKind::LockContention,
            StitchError::RollbackFailure { .. } => ErrorKind::RollbackFailure,
            StitchError::UnknownTarget(_) => ErrorKind::UnknownTarget,
            StitchError::InvalidSpec(_) => ErrorKind::InvalidSpec,
            StitchError::BridgeInstall { .. } => ErrorKind::BridgeInstall,
            StitchError::Io { .. } => ErrorKind::Io,
            StitchError::Serialize { .. } => ErrorKind::Serialize,
            StitchError::TaskFailed { .. } => ErrorKind::TaskFailed,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn precondition(target: impl Into<String>, message: impl Into<String>) -> Self {
        StitchError::Precondition {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Build a `map_err` adapter that attaches `path` to an I/O error.
pub fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StitchError + '_ {
    move |source| StitchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn late_write_note(late_write: &bool) -> &'static str {
    if *late_write {
        "; the call keeps running and may still write its change"
    } else {
        ""
    }
}

fn display_holder(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => pid.to_string(),
        None => "unknown".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, StitchError>;
