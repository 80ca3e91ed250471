//! Write-in-progress detection for `mediamirror-detector`.
//!
//! `Detector::is_in_use(path)` answers "is something still writing this
//! file?" with two checks:
//!
//! 1. Ask `lsof` for open handles on the path; a handle opened for writing
//!    (`w`) or read-write (`u`) means in use. Skipped when `lsof` is absent.
//! 2. Sample the size, wait [`SIZE_SAMPLE_INTERVAL`], sample again; growth or
//!    shrinkage means in use. Always run when the first check says "idle".
//!
//! This is a heuristic, not a lock: a file can pass and start changing a
//! moment later. Callers re-check on every pass.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

/// Gap between the two size samples.
pub const SIZE_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single `lsof` call.
pub const LSOF_TIMEOUT: Duration = Duration::from_secs(10);

const LSOF: &str = "lsof";

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Anything that can judge whether a file is still being written.
#[async_trait]
pub trait WriteActivity: Send + Sync {
    /// `true` when `path` looks like it is still receiving writes.
    ///
    /// An absent file is never in use.
    async fn is_in_use(&self, path: &Path) -> bool;
}

/// Production detector: `lsof` open-handle check plus size sampling.
#[derive(Debug)]
pub struct Detector {
    sample_interval: Duration,
    use_lsof: bool,
    lsof_available: OnceCell<bool>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self {
            sample_interval: SIZE_SAMPLE_INTERVAL,
            use_lsof: true,
            lsof_available: OnceCell::new(),
        }
    }

    /// Override the gap between size samples.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Rely on size sampling alone.
    pub fn without_lsof(mut self) -> Self {
        self.use_lsof = false;
        self
    }

    /// Whether the open-handle check can run on this host.
    ///
    /// Probed once and cached.
    pub async fn lsof_available(&self) -> bool {
        if !self.use_lsof {
            return false;
        }
        *self
            .lsof_available
            .get_or_init(|| async {
                let available = Command::new(LSOF)
                    .arg("-v")
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .is_ok();
                tracing::debug!(available, "lsof availability check");
                available
            })
            .await
    }

    async fn has_writer(&self, path: &Path) -> Option<bool> {
        if !self.lsof_available().await {
            return None;
        }

        let mut command = Command::new(LSOF);
        command
            .arg("-F")
            .arg("a")
            .arg("--")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // lsof exits 1 when nothing has the file open; only stdout matters.
        match tokio::time::timeout(LSOF_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => Some(has_write_handle(&String::from_utf8_lossy(&output.stdout))),
            Ok(Err(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "lsof failed");
                None
            }
            Err(_) => {
                tracing::warn!(path = %path.display(), "lsof timed out");
                None
            }
        }
    }
}

#[async_trait]
impl WriteActivity for Detector {
    async fn is_in_use(&self, path: &Path) -> bool {
        let Some(before) = file_size(path).await else {
            return false;
        };

        if self.has_writer(path).await == Some(true) {
            tracing::debug!(path = %path.display(), "open write handle found");
            return true;
        }

        tokio::time::sleep(self.sample_interval).await;
        match file_size(path).await {
            Some(after) if after == before => false,
            Some(after) => {
                tracing::debug!(path = %path.display(), before, after, "file size changed");
                true
            }
            // Vanished mid-sample: something is actively moving it.
            None => true,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Scan `lsof -F a` field output for a write (`w`) or read-write (`u`) handle.
pub fn has_write_handle(lsof_fields: &str) -> bool {
    lsof_fields
        .lines()
        .filter_map(|line| line.strip_prefix('a'))
        .any(|mode| matches!(mode.trim(), "w" | "u"))
}

async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Some(meta.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot stat file");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
