//! Error types for mediamirror-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading a configuration file.
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found at {path}")]
    NotFound { path: PathBuf },

    /// A line that is not `KEY=value`.
    #[error("{path}:{line}: {message}")]
    Syntax {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A recognised key with a value that cannot be used.
    #[error("{path}:{line}: invalid value for {key}: {message}")]
    InvalidValue {
        path: PathBuf,
        line: usize,
        key: String,
        message: String,
    },
}
