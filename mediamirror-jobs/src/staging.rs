//! Scratch files and artifact publishing.
//!
//! ## Publish protocol
//!
//! 1. A tool writes into `<temp_dir>/<base>.partial.<ext>`.
//! 2. The staged file must exist and be non-empty.
//! 3. Rename onto the destination (atomic on POSIX).
//! 4. If the rename fails (e.g. temp dir on another filesystem), copy to
//!    `<destination>.mmtmp` next to the destination and rename that.
//!
//! The destination path is only ever replaced by a complete file. Every
//! scratch path is registered with a [`Scratch`] guard that removes it on drop,
//! so no temporaries survive any exit path.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, JobError};

// ---------------------------------------------------------------------------
// Scratch guard
// ---------------------------------------------------------------------------

/// Removes every tracked path when dropped.
#[derive(Debug, Default)]
pub struct Scratch {
    paths: Vec<PathBuf>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for removal and hand it back.
    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.paths {
            remove_if_present(path);
        }
    }
}

/// Delete `path`, ignoring "not found". Other failures are logged.
pub fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove scratch file");
        }
    }
}

// ---------------------------------------------------------------------------
// Scratch naming
// ---------------------------------------------------------------------------

fn split_name(destination: &Path) -> (String, String) {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let ext = destination
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (stem, ext)
}

/// `<temp_dir>/<base>.partial.<ext>`. The extension is kept so tools pick
/// the right output format.
pub fn staged_path(temp_dir: &Path, destination: &Path) -> PathBuf {
    let (stem, ext) = split_name(destination);
    temp_dir.join(format!("{stem}.partial.{ext}"))
}

/// `<temp_dir>/<base>.frame<NN>.jpg`
pub fn frame_path(temp_dir: &Path, destination: &Path, index: usize) -> PathBuf {
    let (stem, _) = split_name(destination);
    temp_dir.join(format!("{stem}.frame{index:02}.jpg"))
}

// ---------------------------------------------------------------------------
// Output checks and publishing
// ---------------------------------------------------------------------------

/// Size of `path`, failing with [`JobError::EmptyOutput`] when it is missing
/// or empty.
pub fn ensure_output(path: &Path) -> Result<u64, JobError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(meta.len()),
        Ok(_) => Err(JobError::EmptyOutput {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(JobError::EmptyOutput {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Write captured tool output to a staged path.
pub fn write_staged(staged: &Path, bytes: &[u8]) -> Result<(), JobError> {
    if let Some(parent) = staged.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(staged, bytes).map_err(|e| io_err(staged, e))
}

/// Move a complete staged file onto `destination`.
pub fn publish(staged: &Path, destination: &Path) -> Result<(), JobError> {
    let bytes = ensure_output(staged)?;

    if fs::rename(staged, destination).is_ok() {
        tracing::debug!(path = %destination.display(), bytes, "published artifact");
        return Ok(());
    }

    let sibling = PathBuf::from(format!("{}.mmtmp", destination.display()));
    let copied = fs::copy(staged, &sibling)
        .map_err(|e| io_err(&sibling, e))
        .and_then(|_| fs::rename(&sibling, destination).map_err(|e| io_err(destination, e)));
    if let Err(err) = copied {
        remove_if_present(&sibling);
        return Err(err);
    }
    remove_if_present(staged);

    tracing::debug!(path = %destination.display(), bytes, "published artifact via copy");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
