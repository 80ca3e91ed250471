//! # mediamirror-sync
//!
//! Keeps one artifact per source file in the destination directory.
//!
//! Call [`run_pass`] to generate every missing or stale artifact, then
//! [`reap`] to delete artifacts whose source has disappeared.

pub mod error;
pub mod pass;
pub mod reaper;
pub mod staleness;

pub use error::SyncError;
pub use pass::{run_pass, PassStats, SyncContext};
pub use reaper::{reap, ReapStats};
pub use staleness::needs_processing;
