//! One sync pass over the source directory.
//!
//! Sources are the immediate regular files of `source_dir`, visited in path
//! order. Each one whose artifact is stale (see [`needs_processing`]) is handed
//! to the instance type's job; on success the source's access and
//! modification times are copied onto the artifact, which is what marks it
//! as synced for the next pass.
//!
//! A failing file is logged and counted; it never stops the pass.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetime::FileTime;
use serde::Serialize;

use mediamirror_core::{artifact_path, Config, InstanceType};
use mediamirror_detector::WriteActivity;
use mediamirror_jobs::{lookup, JobContext, JobEntry, MediaToolkit};

use crate::error::{io_err, SyncError};
use crate::staleness::needs_processing;

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    /// Regular files found in the source directory.
    pub seen: usize,
    /// Artifacts generated and stamped.
    pub processed: usize,
    /// Files whose job (or stamping) failed.
    pub failed: usize,
}

/// Everything a pass needs. Built once at startup.
#[derive(Clone)]
pub struct SyncContext {
    pub config: Arc<Config>,
    pub kind: InstanceType,
    pub jobs: JobContext,
    pub detector: Arc<dyn WriteActivity>,
}

impl SyncContext {
    pub fn new(
        config: Arc<Config>,
        kind: InstanceType,
        tools: Arc<dyn MediaToolkit>,
        detector: Arc<dyn WriteActivity>,
    ) -> Self {
        let jobs = JobContext::from_config(&config, tools);
        Self {
            config,
            kind,
            jobs,
            detector,
        }
    }

    /// Registry row for this process's instance type.
    pub fn entry(&self) -> &'static JobEntry {
        lookup(self.kind)
    }
}

/// Run one pass. Only directory-level failures are returned; per-file
/// failures are folded into [`PassStats::failed`].
pub async fn run_pass(ctx: &SyncContext) -> Result<PassStats, SyncError> {
    let config = &ctx.config;
    for dir in [&config.source_dir, &config.dest_dir, &config.temp_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| io_err(dir.as_path(), e))?;
    }

    let entry = ctx.entry();
    let mut stats = PassStats::default();

    for source in list_regular_files(&config.source_dir).await? {
        stats.seen += 1;
        match process_file(ctx, entry, &source).await {
            Ok(true) => stats.processed += 1,
            Ok(false) => {}
            Err(err) => {
                stats.failed += 1;
                tracing::warn!(
                    kind = %ctx.kind,
                    path = %source.display(),
                    error = %err,
                    "failed to generate artifact",
                );
            }
        }
    }

    tracing::info!(
        kind = %ctx.kind,
        seen = stats.seen,
        processed = stats.processed,
        failed = stats.failed,
        "sync pass complete",
    );
    Ok(stats)
}

/// `Ok(true)` when an artifact was produced, `Ok(false)` when none was needed.
async fn process_file(
    ctx: &SyncContext,
    entry: &JobEntry,
    source: &Path,
) -> Result<bool, SyncError> {
    let destination = artifact_path(&ctx.config.dest_dir, source, entry.extension).ok_or_else(
        || SyncError::NoBaseName {
            path: source.to_path_buf(),
        },
    )?;

    if !needs_processing(source, &destination, ctx.detector.as_ref()).await {
        return Ok(false);
    }

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        "generating artifact",
    );
    let result = (entry.run)(&ctx.jobs, source, &destination)
        .await
        .map_err(|err| SyncError::Job {
            path: source.to_path_buf(),
            source: err,
        })
        .and_then(|()| mirror_times(source, &destination));
    if result.is_err() {
        remove_empty_artifact(&destination);
    }
    result.map(|()| true)
}

/// Copy `source`'s access and modification times onto `destination`.
fn mirror_times(source: &Path, destination: &Path) -> Result<(), SyncError> {
    let meta = std::fs::metadata(source).map_err(|e| io_err(source, e))?;
    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_times(destination, atime, mtime).map_err(|e| io_err(destination, e))
}

fn remove_empty_artifact(path: &Path) {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove empty artifact");
            }
        }
        _ => {}
    }
}

/// Immediate regular files of `dir`, sorted by path.
pub(crate) async fn list_regular_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| io_err(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(dir, e))? {
        let path = entry.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => {}
            // Removed between listing and stat.
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat directory entry");
            }
        }
    }
    files.sort();
    Ok(files)
}
