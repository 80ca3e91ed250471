//! Instance type → artifact job table.
//!
//! | Instance  | Extension | Procedure                               |
//! |-----------|-----------|-----------------------------------------|
//! | filmstrip | `jpg`     | [`filmstrip::run`]                      |
//! | waveform  | `gif`     | [`audio::run_waveform`]                 |
//! | r128sum   | `r128sum` | [`audio::run_r128_summary`]             |
//! | r128log   | `r128log` | [`audio::run_r128_log`]                 |
//! | xmlinfo   | `xml`     | [`metadata::run_xml`]                   |
//! | jsoninfo  | `json`    | [`metadata::run_json`]                  |
//! | mxfinfo   | `xml`     | [`metadata::run_mxf`]                   |
//!
//! Adding an artifact kind means adding one row here and one variant to
//! [`InstanceType`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use mediamirror_core::{Config, InstanceType};

use crate::error::JobError;
use crate::toolkit::MediaToolkit;
use crate::{audio, filmstrip, metadata};

/// Boxed future returned by every job procedure.
pub type JobFuture<'a> = Pin<Box<dyn Future<Output = Result<(), JobError>> + Send + 'a>>;

/// `run(ctx, source, destination)`: produce `destination` from `source`, or
/// fail without touching it.
pub type JobFn = for<'a> fn(&'a JobContext, &'a Path, &'a Path) -> JobFuture<'a>;

/// Everything a job needs besides its two paths.
#[derive(Clone)]
pub struct JobContext {
    pub tools: Arc<dyn MediaToolkit>,
    pub temp_dir: PathBuf,
    /// Width of one filmstrip frame; waveforms span the whole strip.
    pub image_width: u32,
    pub allow_missing_frames: bool,
}

impl JobContext {
    pub fn from_config(config: &Config, tools: Arc<dyn MediaToolkit>) -> Self {
        Self {
            tools,
            temp_dir: config.temp_dir.clone(),
            image_width: config.image_width,
            allow_missing_frames: config.allow_missing_frames,
        }
    }
}

/// One row of the registry.
#[derive(Clone, Copy)]
pub struct JobEntry {
    pub kind: InstanceType,
    pub extension: &'static str,
    pub run: JobFn,
}

impl std::fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobEntry")
            .field("kind", &self.kind)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Ordered like [`InstanceType::all`], so a variant indexes its own row.
pub static REGISTRY: [JobEntry; 7] = [
    JobEntry {
        kind: InstanceType::Filmstrip,
        extension: "jpg",
        run: filmstrip::run,
    },
    JobEntry {
        kind: InstanceType::Waveform,
        extension: "gif",
        run: audio::run_waveform,
    },
    JobEntry {
        kind: InstanceType::R128sum,
        extension: "r128sum",
        run: audio::run_r128_summary,
    },
    JobEntry {
        kind: InstanceType::R128log,
        extension: "r128log",
        run: audio::run_r128_log,
    },
    JobEntry {
        kind: InstanceType::Xmlinfo,
        extension: "xml",
        run: metadata::run_xml,
    },
    JobEntry {
        kind: InstanceType::Jsoninfo,
        extension: "json",
        run: metadata::run_json,
    },
    JobEntry {
        kind: InstanceType::Mxfinfo,
        extension: "xml",
        run: metadata::run_mxf,
    },
];

/// Registry row for `kind`.
pub fn lookup(kind: InstanceType) -> &'static JobEntry {
    &REGISTRY[kind as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_instance_type_indexes_its_own_row() {
        for kind in InstanceType::all() {
            assert_eq!(lookup(*kind).kind, *kind);
        }
    }

    #[test]
    fn extensions_match_the_published_table() {
        let table: Vec<(&str, &str)> = REGISTRY
            .iter()
            .map(|e| (e.kind.as_str(), e.extension))
            .collect();
        assert_eq!(
            table,
            vec![
                ("filmstrip", "jpg"),
                ("waveform", "gif"),
                ("r128sum", "r128sum"),
                ("r128log", "r128log"),
                ("xmlinfo", "xml"),
                ("jsoninfo", "json"),
                ("mxfinfo", "xml"),
            ]
        );
    }
}
