//! mediamirror core library: domain types, configuration, errors.
//!
//! - [`types`]: instance types and artifact path derivation
//! - [`config`]: layered `KEY=value` configuration
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use types::{artifact_path, base_name, has_extension, InstanceType, MIN_SOURCE_BYTES};
