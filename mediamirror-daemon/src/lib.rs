//! Scheduler loop: periodic sync and reap passes for one instance type,
//! plus logging setup and graceful stop on SIGINT/SIGTERM.

mod error;
pub mod log_rotation;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    init_tracing, preflight, run, run_iteration, start_blocking, with_bootstrap_logging,
    IterationReport, RunMode,
};
