//! Orphan reaper: delete artifacts whose source is gone.
//!
//! Only files carrying exactly the instance's extension are candidates, so
//! a reaper never touches another instance type's artifacts (unless the two
//! share an extension and a destination directory).

use std::collections::HashSet;
use std::io::ErrorKind;

use serde::Serialize;

use mediamirror_core::{base_name, has_extension, Config};

use crate::error::SyncError;
use crate::pass::list_regular_files;

/// Counters for one reap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapStats {
    /// Destination files with the instance's extension.
    pub examined: usize,
    pub removed: usize,
}

/// Remove every `*.{extension}` artifact in `dest_dir` with no matching
/// source base name.
///
/// An unreadable source directory is an error, never "no sources": that
/// would wipe the whole destination.
pub async fn reap(config: &Config, extension: &str) -> Result<ReapStats, SyncError> {
    if config.disable_removal {
        tracing::debug!("artifact removal disabled");
        return Ok(ReapStats::default());
    }

    let sources = list_regular_files(&config.source_dir).await?;
    let live: HashSet<String> = sources
        .iter()
        .filter_map(|p| base_name(p))
        .map(str::to_owned)
        .collect();

    let artifacts = match list_regular_files(&config.dest_dir).await {
        Ok(files) => files,
        Err(SyncError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
            return Ok(ReapStats::default())
        }
        Err(err) => return Err(err),
    };

    let mut stats = ReapStats::default();
    for artifact in artifacts.iter().filter(|p| has_extension(p, extension)) {
        stats.examined += 1;
        let Some(base) = base_name(artifact) else {
            continue;
        };
        if live.contains(base) {
            continue;
        }
        match tokio::fs::remove_file(artifact).await {
            Ok(()) => {
                stats.removed += 1;
                tracing::info!(path = %artifact.display(), "removed orphaned artifact");
            }
            Err(err) => {
                tracing::warn!(path = %artifact.display(), error = %err, "failed to remove orphaned artifact");
            }
        }
    }

    tracing::info!(
        extension,
        examined = stats.examined,
        removed = stats.removed,
        "reap complete",
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use tempfile::TempDir;

    fn config(root: &TempDir) -> Config {
        let config = Config {
            source_dir: root.path().join("src"),
            dest_dir: root.path().join("dst"),
            ..Config::default()
        };
        fs::create_dir_all(&config.source_dir).unwrap();
        fs::create_dir_all(&config.dest_dir).unwrap();
        config
    }

    #[tokio::test]
    async fn disabled_removal_touches_nothing() {
        let root = TempDir::new().unwrap();
        let mut config = config(&root);
        config.disable_removal = true;
        fs::write(config.dest_dir.join("gone.json"), "{}").unwrap();

        assert_eq!(reap(&config, "json").await.unwrap(), ReapStats::default());
        assert!(config.dest_dir.join("gone.json").exists());
    }

    #[tokio::test]
    async fn only_the_exact_extension_is_reaped() {
        let root = TempDir::new().unwrap();
        let config = config(&root);
        for name in ["gone.json", "gone.JSON", "gone.json.bak", "gone.jpg"] {
            fs::write(config.dest_dir.join(name), "x").unwrap();
        }

        let stats = reap(&config, "json").await.unwrap();

        assert_eq!(stats, ReapStats { examined: 1, removed: 1 });
        assert!(!config.dest_dir.join("gone.json").exists());
        assert!(config.dest_dir.join("gone.JSON").exists());
        assert!(config.dest_dir.join("gone.json.bak").exists());
        assert!(config.dest_dir.join("gone.jpg").exists());
    }

    #[tokio::test]
    async fn any_source_extension_keeps_the_artifact() {
        let root = TempDir::new().unwrap();
        let config = config(&root);
        fs::write(config.source_dir.join("clip.mxf"), "tiny").unwrap();
        fs::write(config.dest_dir.join("clip.json"), "{}").unwrap();

        let stats = reap(&config, "json").await.unwrap();

        assert_eq!(stats, ReapStats { examined: 1, removed: 0 });
        assert!(config.dest_dir.join("clip.json").exists());
    }

    #[tokio::test]
    async fn missing_source_directory_is_an_error() {
        let root = TempDir::new().unwrap();
        let config = config(&root);
        fs::write(config.dest_dir.join("clip.json"), "{}").unwrap();
        fs::remove_dir(&config.source_dir).unwrap();

        assert!(reap(&config, "json").await.is_err());
        assert!(config.dest_dir.join("clip.json").exists());
    }
}
