//! Staleness oracle: does an artifact need (re)generating?
//!
//! Decision order:
//! 1. Source missing, not a regular file, or not larger than
//!    [`MIN_SOURCE_BYTES`] → no.
//! 2. Destination missing or empty → yes, unless the source is still being
//!    written.
//! 3. Destination modification time differs from the source's → yes, unless
//!    the source is still being written.
//! 4. Otherwise → no.
//!
//! Equal modification times are the "already synced" marker; the pass stamps
//! the source's times onto every artifact it publishes. An artifact restored
//! with a matching time but stale content is therefore treated as current.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::Path;

use filetime::FileTime;

use mediamirror_core::MIN_SOURCE_BYTES;
use mediamirror_detector::WriteActivity;

/// Whether `destination` must be produced from `source` on this pass.
pub async fn needs_processing(
    source: &Path,
    destination: &Path,
    detector: &dyn WriteActivity,
) -> bool {
    let Some(src) = metadata(source).await else {
        return false;
    };
    if !src.is_file() || src.len() <= MIN_SOURCE_BYTES {
        return false;
    }

    let dst = metadata(destination).await.filter(|m| m.len() > 0);
    if let Some(dst) = &dst {
        let synced = FileTime::from_last_modification_time(&src)
            == FileTime::from_last_modification_time(dst);
        if synced {
            return false;
        }
    }

    if detector.is_in_use(source).await {
        tracing::debug!(path = %source.display(), "source still being written, deferring");
        return false;
    }
    true
}

async fn metadata(path: &Path) -> Option<Metadata> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Some(meta),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "cannot stat file");
            None
        }
    }
}
