//! Error taxonomy for the indexing engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::SchedulerError;

/// Errors raised while scheduling, scanning or reconciling a library.
///
/// Per-unit failures (one title folder) are logged and counted by the
/// indexer; they never abort the rest of the pass.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Cron expression could not be parsed.
    #[error("invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    /// A configured library folder is relative or cannot be made absolute.
    #[error("library folder '{}' is not an absolute path", path.display())]
    PathResolution { path: PathBuf },

    /// A catalog read or write failed; the surrounding transaction was rolled back.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// The pass was cancelled before all units were dispatched.
    #[error("indexing interrupted")]
    Interrupted,

    /// The cron timer itself failed (not a bad expression).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// The title was repointed at another folder (or deleted) while this
    /// folder was being reconciled.
    #[error("title '{slug}' is no longer backed by '{}'", path.display())]
    TitleMoved {
        slug: String,
        path: PathBuf,
        current: Option<String>,
    },

    #[error("library '{0}' not found")]
    LibraryNotFound(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IndexerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Cancellation is a clean early stop, not a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

impl From<SchedulerError> for IndexerError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::InvalidSchedule { expr, reason } => Self::InvalidSchedule { expr, reason },
            other => Self::Scheduler(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for IndexerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(e) => Self::Persistence(e),
            Err(other) => Self::Persistence(sqlx::Error::Protocol(other.to_string())),
        }
    }
}
