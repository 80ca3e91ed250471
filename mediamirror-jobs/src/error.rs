//! Error types for mediamirror-jobs.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why a single artifact-generation attempt failed.
///
/// Every variant is a per-file, retry-next-pass failure.
#[derive(Debug, Error)]
pub enum JobError {
    /// Filesystem error while staging or publishing output.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external tool is not installed.
    #[error("{tool} is not installed")]
    ToolMissing { tool: String },

    /// The external tool could not be started.
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool did not finish in time and was killed.
    #[error("{tool} timed out after {}s", after.as_secs())]
    Timeout { tool: String, after: Duration },

    /// The external tool exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Tool output could not be interpreted.
    #[error("unreadable {tool} output: {message}")]
    Parse { tool: String, message: String },

    /// Expected output file is missing or empty.
    #[error("no output produced at {path}")]
    EmptyOutput { path: PathBuf },

    /// The expected section was absent from the tool's report.
    #[error("no {section} found in loudness report")]
    MissingSection { section: &'static str },

    /// Duration could not be determined or was not positive.
    #[error("could not determine duration of {path}")]
    NoDuration { path: PathBuf },

    /// Too few filmstrip frames were extracted.
    #[error("extracted {extracted} of {expected} frames")]
    FramesMissing { extracted: usize, expected: usize },

    /// The job only handles a specific container format.
    #[error("{path} is not an MXF file")]
    UnsupportedFormat { path: PathBuf },
}

/// Convenience constructor for [`JobError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> JobError {
    JobError::Io {
        path: path.into(),
        source,
    }
}
