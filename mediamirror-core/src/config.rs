//! Layered `KEY=value` configuration.
//!
//! # Lookup order
//!
//! ```text
//! 1. explicit path (--config / $MEDIAMIRROR_CONFIG)   must exist
//! 2. /etc/mediamirror/mediamirror.conf                 optional
//! 3. <config_dir>/mediamirror/mediamirror.conf         optional
//! ```
//!
//! The first file found is the only one read; later layers are never
//! consulted. With no file at all every key takes its default.
//!
//! # API pattern
//!
//! - `load(explicit)`: resolves the standard layers
//! - `load_from_layers(explicit, candidates)`: explicit candidate list; used in tests
//! - `parse_str(text, origin)`: parse one file's contents over the defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "MEDIAMIRROR_CONFIG";
pub const CONFIG_FILE_NAME: &str = "mediamirror.conf";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/mediamirror/mediamirror.conf";

pub const DEFAULT_SOURCE_DIR: &str = "/srv/mediamirror/source";
pub const DEFAULT_DEST_DIR: &str = "/srv/mediamirror/derived";
pub const DEFAULT_TEMP_DIR: &str = "/tmp/mediamirror";
pub const DEFAULT_IMAGE_WIDTH: u32 = 320;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Process-wide settings. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Skip orphan removal entirely.
    pub disable_removal: bool,
    /// Tile a filmstrip even when some frames could not be extracted.
    pub allow_missing_frames: bool,
    /// Width in pixels of one filmstrip frame.
    pub image_width: u32,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub poll_interval: Duration,
    /// Upper bound on a single external tool invocation.
    pub job_timeout: Duration,
    /// File the settings were read from, if any.
    pub origin: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            dest_dir: PathBuf::from(DEFAULT_DEST_DIR),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            disable_removal: false,
            allow_missing_frames: false,
            image_width: DEFAULT_IMAGE_WIDTH,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            origin: None,
        }
    }
}

// ---------------------------------------------------------------------------
// 1. Layer resolution
// ---------------------------------------------------------------------------

/// Standard optional layers, system first.
pub fn default_layers() -> Vec<PathBuf> {
    let mut layers = vec![PathBuf::from(SYSTEM_CONFIG_PATH)];
    if let Some(dir) = dirs::config_dir() {
        layers.push(dir.join("mediamirror").join(CONFIG_FILE_NAME));
    }
    layers
}

/// Load configuration from the standard layers.
///
/// `explicit` wins over `$MEDIAMIRROR_CONFIG`; either one must exist.
pub fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let from_env = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let explicit = explicit.map(Path::to_path_buf).or(from_env);
    load_from_layers(explicit.as_deref(), &default_layers())
}

/// Load from an explicit path or the first existing candidate.
pub fn load_from_layers(
    explicit: Option<&Path>,
    candidates: &[PathBuf],
) -> Result<Config, ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_file(path);
    }

    match candidates.iter().find(|p| p.is_file()) {
        Some(path) => read_file(path),
        None => {
            tracing::debug!("no configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = parse_str(&text, path)?;
    config.origin = Some(path.to_path_buf());
    Ok(config)
}

// ---------------------------------------------------------------------------
// 2. Parsing
// ---------------------------------------------------------------------------

/// Parse `KEY=value` text over the defaults.
///
/// `origin` is only used for error messages.
pub fn parse_str(text: &str, origin: &Path) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Syntax {
                path: origin.to_path_buf(),
                line: line_no,
                message: format!("expected KEY=value, got '{line}'"),
            });
        };
        let key = key.trim();
        let value = unquote(value.trim());
        let invalid = |message: String| ConfigError::InvalidValue {
            path: origin.to_path_buf(),
            line: line_no,
            key: key.to_string(),
            message,
        };

        match key {
            "SOURCE_DIR" => config.source_dir = non_empty_path(value).map_err(invalid)?,
            "DEST_DIR" => config.dest_dir = non_empty_path(value).map_err(invalid)?,
            "TEMP_DIR" => config.temp_dir = non_empty_path(value).map_err(invalid)?,
            "DISABLE_REMOVAL" => config.disable_removal = parse_bool(value).map_err(invalid)?,
            "ALLOW_MISSING_FRAMES" => {
                config.allow_missing_frames = parse_bool(value).map_err(invalid)?
            }
            "IMAGE_WIDTH" => config.image_width = parse_positive(value).map_err(invalid)?,
            "LOG_LEVEL" => config.log_level = value.to_string(),
            "LOG_FILE" => {
                config.log_file = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                }
            }
            "POLL_INTERVAL" => {
                config.poll_interval =
                    Duration::from_secs(parse_positive(value).map_err(invalid)?.into())
            }
            "JOB_TIMEOUT" => {
                config.job_timeout =
                    Duration::from_secs(parse_positive(value).map_err(invalid)?.into())
            }
            other => {
                tracing::warn!(
                    path = %origin.display(),
                    line = line_no,
                    key = other,
                    "ignoring unknown configuration key",
                );
            }
        }
    }

    Ok(config)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn non_empty_path(value: &str) -> Result<PathBuf, String> {
    if value.is_empty() {
        return Err("path must not be empty".to_string());
    }
    Ok(PathBuf::from(value))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected a boolean, got '{other}'")),
    }
}

fn parse_positive(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(err) => Err(format!("expected a positive integer, got '{value}': {err}")),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(text: &str) -> Result<Config, ConfigError> {
        parse_str(text, Path::new("test.conf"))
    }

    #[test]
    fn empty_text_yields_defaults() {
        assert_eq!(parse("").unwrap(), Config::default());
    }

    #[test]
    fn recognised_keys_override_defaults() {
        let config = parse(
            "# mirror settings\n\
             SOURCE_DIR=/media/in\n\
             export DEST_DIR=\"/media/out\"\n\
             TEMP_DIR='/scratch'\n\
             DISABLE_REMOVAL=yes\n\
             ALLOW_MISSING_FRAMES=1\n\
             IMAGE_WIDTH=200\n\
             LOG_LEVEL=debug\n\
             LOG_FILE=/var/log/mediamirror.log\n\
             POLL_INTERVAL=5\n\
             JOB_TIMEOUT=90\n",
        )
        .unwrap();

        assert_eq!(config.source_dir, PathBuf::from("/media/in"));
        assert_eq!(config.dest_dir, PathBuf::from("/media/out"));
        assert_eq!(config.temp_dir, PathBuf::from("/scratch"));
        assert!(config.disable_removal);
        assert!(config.allow_missing_frames);
        assert_eq!(config.image_width, 200);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/mediamirror.log")));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.job_timeout, Duration::from_secs(90));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = parse("FAVOURITE_CODEC=prores\nIMAGE_WIDTH=64\n").unwrap();
        assert_eq!(config.image_width, 64);
    }

    #[rstest]
    #[case("on", true)]
    #[case("TRUE", true)]
    #[case("off", false)]
    #[case("0", false)]
    #[case("", false)]
    fn booleans_accept_common_spellings(#[case] raw: &str, #[case] expected: bool) {
        let config = parse(&format!("DISABLE_REMOVAL={raw}")).unwrap();
        assert_eq!(config.disable_removal, expected);
    }

    #[rstest]
    #[case("IMAGE_WIDTH=0")]
    #[case("IMAGE_WIDTH=wide")]
    #[case("POLL_INTERVAL=-3")]
    #[case("DISABLE_REMOVAL=maybe")]
    #[case("SOURCE_DIR=")]
    fn invalid_values_name_the_key_and_line(#[case] line: &str) {
        let text = format!("# header\n{line}\n");
        match parse(&text) {
            Err(ConfigError::InvalidValue { key, line, .. }) => {
                assert_eq!(line, 2);
                assert!(text.contains(&key));
            }
            other => panic!("expected invalid value, got {other:?}"),
        }
    }

    #[test]
    fn line_without_equals_is_a_syntax_error() {
        let err = parse("SOURCE_DIR /media").unwrap_err();
        assert!(matches!(err, ConfigError::Syntax { line: 1, .. }));
    }

    #[test]
    fn empty_log_file_means_stderr() {
        let config = parse("LOG_FILE=").unwrap();
        assert_eq!(config.log_file, None);
    }
}
