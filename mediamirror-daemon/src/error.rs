use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop the daemon. Per-file and per-pass problems never
/// surface here; they are logged and retried.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required tools not found: {}", tools.join(", "))]
    MissingTools { tools: Vec<&'static str> },

    #[error("signal handler failed: {0}")]
    Signal(#[source] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
