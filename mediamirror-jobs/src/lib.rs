//! # mediamirror-jobs
//!
//! Artifact generation: one job procedure per [`InstanceType`], each turning
//! a source media file into a derived artifact through the external tools
//! behind [`MediaToolkit`].
//!
//! Jobs never write the destination directly. Output is staged in the temp
//! directory and moved into place only when complete (see [`staging`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use mediamirror_core::{Config, InstanceType};
//! use mediamirror_jobs::{lookup, ExternalToolkit, JobContext};
//!
//! async fn make_filmstrip(config: &Config) {
//!     let tools = Arc::new(ExternalToolkit::new(Duration::from_secs(3600)));
//!     let ctx = JobContext::from_config(config, tools);
//!     let entry = lookup(InstanceType::Filmstrip);
//!     let _ = (entry.run)(&ctx, Path::new("/media/clip.mov"), Path::new("/out/clip.jpg")).await;
//! }
//! ```
//!
//! [`InstanceType`]: mediamirror_core::InstanceType

pub mod audio;
pub mod error;
pub mod filmstrip;
pub mod metadata;
pub mod registry;
pub mod staging;
pub mod toolkit;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::JobError;
pub use registry::{lookup, JobContext, JobEntry, JobFn, JobFuture, REGISTRY};
pub use toolkit::{ExternalToolkit, MediaToolkit, ToolReport};
