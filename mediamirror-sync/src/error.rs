//! Error types for mediamirror-sync.

use std::path::PathBuf;

use thiserror::Error;

use mediamirror_jobs::JobError;

/// Errors that abort a whole pass, or that are reported per file inside one.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact generation failed for one source.
    #[error("job failed for {path}: {source}")]
    Job {
        path: PathBuf,
        #[source]
        source: JobError,
    },

    /// The source has no usable base name (e.g. `..`).
    #[error("cannot derive an artifact name from {path}")]
    NoBaseName { path: PathBuf },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
