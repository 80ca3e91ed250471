//! Domain types shared across the mediamirror workspace.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Sources at or below this size are never processed (64 KiB).
pub const MIN_SOURCE_BYTES: u64 = 64 * 1024;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of artifact one daemon process produces.
///
/// Chosen once at startup; every process runs exactly one instance type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Filmstrip,
    Waveform,
    R128sum,
    R128log,
    Xmlinfo,
    Jsoninfo,
    Mxfinfo,
}

impl InstanceType {
    /// Every instance type, in CLI listing order.
    pub fn all() -> &'static [InstanceType] {
        &[
            InstanceType::Filmstrip,
            InstanceType::Waveform,
            InstanceType::R128sum,
            InstanceType::R128log,
            InstanceType::Xmlinfo,
            InstanceType::Jsoninfo,
            InstanceType::Mxfinfo,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceType::Filmstrip => "filmstrip",
            InstanceType::Waveform => "waveform",
            InstanceType::R128sum => "r128sum",
            InstanceType::R128log => "r128log",
            InstanceType::Xmlinfo => "xmlinfo",
            InstanceType::Jsoninfo => "jsoninfo",
            InstanceType::Mxfinfo => "mxfinfo",
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        InstanceType::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let expected: Vec<&str> = InstanceType::all().iter().map(|k| k.as_str()).collect();
                format!(
                    "unknown instance type '{s}'; expected one of: {}",
                    expected.join(", ")
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Stable base name of a file: its name without the final extension.
pub fn base_name(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// `{dest_dir}/{base}.{extension}` for a source file. Pure, no I/O.
///
/// Returns `None` when the source has no UTF-8 base name.
pub fn artifact_path(dest_dir: &Path, source: &Path, extension: &str) -> Option<PathBuf> {
    base_name(source).map(|base| dest_dir.join(format!("{base}.{extension}")))
}

/// Whether `path` carries exactly `extension` (case-sensitive).
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(extension)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_type_display_matches_cli_name() {
        assert_eq!(InstanceType::R128sum.to_string(), "r128sum");
        assert_eq!(InstanceType::Jsoninfo.to_string(), "jsoninfo");
    }

    #[test]
    fn instance_type_parses_case_insensitively() {
        assert_eq!("FilmStrip".parse::<InstanceType>(), Ok(InstanceType::Filmstrip));
        assert_eq!(" mxfinfo ".parse::<InstanceType>(), Ok(InstanceType::Mxfinfo));
    }

    #[test]
    fn unknown_instance_type_lists_choices() {
        let err = "thumbnail".parse::<InstanceType>().unwrap_err();
        assert!(err.contains("thumbnail"));
        assert!(err.contains("waveform"));
    }

    #[test]
    fn every_variant_roundtrips_through_its_name() {
        for kind in InstanceType::all() {
            assert_eq!(kind.as_str().parse::<InstanceType>(), Ok(*kind));
        }
        assert_eq!(InstanceType::all().len(), 7);
    }

    #[test]
    fn artifact_path_replaces_only_the_final_extension() {
        let dest = Path::new("/derived");
        assert_eq!(
            artifact_path(dest, Path::new("/src/clip.mov"), "json"),
            Some(PathBuf::from("/derived/clip.json"))
        );
        assert_eq!(
            artifact_path(dest, Path::new("/src/take.2.mxf"), "jpg"),
            Some(PathBuf::from("/derived/take.2.jpg"))
        );
        assert_eq!(
            artifact_path(dest, Path::new("/src/README"), "xml"),
            Some(PathBuf::from("/derived/README.xml"))
        );
    }

    #[test]
    fn extension_match_is_exact() {
        assert!(has_extension(Path::new("a.json"), "json"));
        assert!(!has_extension(Path::new("a.JSON"), "json"));
        assert!(!has_extension(Path::new("a.json.tmp"), "json"));
        assert!(!has_extension(Path::new("json"), "json"));
    }

    #[test]
    fn instance_type_serializes_lowercase() {
        let encoded = serde::de::value::StrDeserializer::<serde::de::value::Error>::new("waveform");
        let decoded = InstanceType::deserialize(encoded).expect("deserialize");
        assert_eq!(decoded, InstanceType::Waveform);
    }
}
