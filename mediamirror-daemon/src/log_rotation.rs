//! Size-based rotation of the configured log file.
//!
//! When `LOG_FILE` exceeds 10 MiB it is shifted to `<name>.1`, older copies
//! move up by one, and at most 5 copies are kept:
//!   mediamirror.log → mediamirror.log.1 → … → mediamirror.log.5
//!
//! [`LogFileWriter`] keeps one append handle open. A handle follows the
//! renamed file, so [`rotate_log`] swaps in a fresh one for the registered
//! writer after every rotation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Writer installed by `init_tracing`; reopened by [`rotate_log`].
static ACTIVE_WRITER: OnceLock<LogFileWriter> = OnceLock::new();

/// Shift `log_path` into the numbered copies once it reaches `max_bytes`.
///
/// The oldest copy (`<name>.<max_files>`) is dropped, the rest move up by
/// one, and an empty `<name>` takes the live file's place. Returns whether
/// a rotation happened; a log that does not exist yet is never rotated.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    match fs::metadata(log_path) {
        Ok(meta) if meta.len() >= max_bytes => {}
        Ok(_) => return Ok(false),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    }

    skip_missing(fs::remove_file(numbered_path(log_path, max_files)))?;
    for n in (1..max_files).rev() {
        skip_missing(fs::rename(
            numbered_path(log_path, n),
            numbered_path(log_path, n + 1),
        ))?;
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;
    append_to(log_path)?;
    Ok(true)
}

/// Rotate the configured log file, if any. Failures are logged, not returned.
pub fn rotate_log(log_file: Option<&Path>) {
    let Some(log_path) = log_file else {
        return;
    };
    match rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => {
            if let Some(writer) = ACTIVE_WRITER.get().filter(|w| w.path == log_path) {
                if let Err(err) = writer.reopen() {
                    tracing::warn!(path = %log_path.display(), error = %err, "log file reopen failed");
                }
            }
            tracing::info!(path = %log_path.display(), "log file rotated");
        }
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed"),
    }
}

/// Build the path for the `n`-th rotated copy of `base` (e.g. `mediamirror.log.2`).
fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("mediamirror.log");
    base.with_file_name(format!("{name}.{n}"))
}

fn skip_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Appends log events to one open handle on `path`.
#[derive(Debug, Clone)]
pub struct LogFileWriter {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl LogFileWriter {
    /// Create the parent directory and open `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(Mutex::new(append_to(path)?)),
        })
    }

    /// Replace the handle with a fresh one on the same path.
    pub fn reopen(&self) -> io::Result<()> {
        let fresh = append_to(&self.path)?;
        *self.lock() = fresh;
        Ok(())
    }

    /// Make this the writer [`rotate_log`] reopens. Only the first call wins.
    pub fn register(&self) {
        let _ = ACTIVE_WRITER.set(self.clone());
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to the log handle for the duration of one event.
pub struct LogFileGuard<'a>(MutexGuard<'a, File>);

impl Write for LogFileGuard<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileGuard<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileGuard(self.lock())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
