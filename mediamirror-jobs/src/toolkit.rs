//! External media tools behind the [`MediaToolkit`] trait.
//!
//! | Role                          | Tool        |
//! |-------------------------------|-------------|
//! | duration, metadata dumps      | `ffprobe`   |
//! | frames, tiling, waveform, R128| `ffmpeg`    |
//! | fallback duration             | `mediainfo` |
//! | MXF container info (optional) | `mxf2raw`   |
//!
//! Every invocation runs with stdin closed, output captured, and a timeout;
//! a timed-out child is killed when its future is dropped.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::error::JobError;

pub const FFPROBE: &str = "ffprobe";
pub const FFMPEG: &str = "ffmpeg";
pub const MEDIAINFO: &str = "mediainfo";
pub const MXF2RAW: &str = "mxf2raw";

/// Tools the daemon refuses to start without.
pub const REQUIRED_TOOLS: &[&str] = &[FFPROBE, FFMPEG, MEDIAINFO];

/// Tools whose absence only disables part of the functionality.
pub const OPTIONAL_TOOLS: &[&str] = &[MXF2RAW];

const STDERR_TAIL_BYTES: usize = 2048;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Container family of a source, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Generic,
    Mxf,
}

impl ContainerKind {
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("mxf") => ContainerKind::Mxf,
            _ => ContainerKind::Generic,
        }
    }
}

/// Which audio streams feed a waveform or loudness analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioLayout {
    /// First two audio streams merged (typical for split-mono broadcast files).
    DualTrack,
    /// First audio stream only.
    SingleTrack,
}

impl AudioLayout {
    fn filter_input(self) -> &'static str {
        match self {
            AudioLayout::DualTrack => "[0:a:0][0:a:1]amerge=inputs=2,",
            AudioLayout::SingleTrack => "[0:a:0]",
        }
    }
}

impl fmt::Display for AudioLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioLayout::DualTrack => f.write_str("dual-track"),
            AudioLayout::SingleTrack => f.write_str("single-track"),
        }
    }
}

/// How much of the loudness analysis to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoudnessDetail {
    Summary,
    Frames,
}

/// Structured text format of a metadata dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataFormat {
    Xml,
    Json,
}

impl MetadataFormat {
    fn writer(self) -> &'static str {
        match self {
            MetadataFormat::Xml => "xml",
            MetadataFormat::Json => "json",
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The black-box operations jobs are built from.
///
/// Implementations never touch the artifact destination; they only write the
/// output paths they are handed.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Total duration in seconds, `None` when it cannot be determined.
    async fn probe_duration(
        &self,
        source: &Path,
        container: ContainerKind,
    ) -> Result<Option<f64>, JobError>;

    /// Decode one frame at `at` seconds, scaled to `width`, into `output`.
    async fn extract_frame(
        &self,
        source: &Path,
        container: ContainerKind,
        at: f64,
        width: u32,
        output: &Path,
    ) -> Result<(), JobError>;

    /// Place `frames` side by side, left to right, into `output`.
    async fn tile_frames(&self, frames: &[PathBuf], output: &Path) -> Result<(), JobError>;

    /// Render a `width`×`height` waveform image into `output`.
    async fn render_waveform(
        &self,
        source: &Path,
        layout: AudioLayout,
        width: u32,
        height: u32,
        output: &Path,
    ) -> Result<(), JobError>;

    /// Run an EBU R128 analysis and return the analyser's log text.
    async fn analyze_loudness(
        &self,
        source: &Path,
        layout: AudioLayout,
        detail: LoudnessDetail,
    ) -> Result<String, JobError>;

    /// Full stream/format metadata.
    async fn dump_metadata(
        &self,
        source: &Path,
        format: MetadataFormat,
    ) -> Result<Vec<u8>, JobError>;

    /// MXF-specific container metadata as XML.
    async fn mxf_info(&self, source: &Path) -> Result<Vec<u8>, JobError>;
}

// ---------------------------------------------------------------------------
// Production implementation
// ---------------------------------------------------------------------------

/// [`MediaToolkit`] backed by ffmpeg, ffprobe, mediainfo and mxf2raw.
#[derive(Debug, Clone)]
pub struct ExternalToolkit {
    timeout: Duration,
}

/// Which tools were found at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolReport {
    pub missing_required: Vec<&'static str>,
    pub missing_optional: Vec<&'static str>,
}

impl ToolReport {
    pub fn is_usable(&self) -> bool {
        self.missing_required.is_empty()
    }
}

impl ExternalToolkit {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Check which external tools can be started.
    pub async fn preflight(&self) -> ToolReport {
        let mut report = ToolReport::default();
        for tool in REQUIRED_TOOLS {
            if !tool_present(tool).await {
                report.missing_required.push(tool);
            }
        }
        for tool in OPTIONAL_TOOLS {
            if !tool_present(tool).await {
                report.missing_optional.push(tool);
            }
        }
        report
    }

    async fn run<I, S>(&self, tool: &str, args: I) -> Result<Output, JobError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        tracing::debug!(tool, args = ?args, "running external tool");

        let mut command = Command::new(tool);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(JobError::Timeout {
                    tool: tool.to_string(),
                    after: self.timeout,
                })
            }
            Ok(Err(err)) if err.kind() == ErrorKind::NotFound => {
                return Err(JobError::ToolMissing {
                    tool: tool.to_string(),
                })
            }
            Ok(Err(err)) => {
                return Err(JobError::Spawn {
                    tool: tool.to_string(),
                    source: err,
                })
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            return Err(JobError::ToolFailed {
                tool: tool.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }

    async fn ffprobe_duration(&self, source: &Path) -> Result<Option<f64>, JobError> {
        let output = self
            .run(
                FFPROBE,
                [
                    OsStr::new("-v"),
                    OsStr::new("error"),
                    OsStr::new("-show_entries"),
                    OsStr::new("format=duration"),
                    OsStr::new("-of"),
                    OsStr::new("json"),
                    source.as_os_str(),
                ],
            )
            .await?;
        parse_ffprobe_duration(&output.stdout)
    }

    async fn mediainfo_duration(&self, source: &Path) -> Result<Option<f64>, JobError> {
        let output = self
            .run(MEDIAINFO, [OsStr::new("--Output=JSON"), source.as_os_str()])
            .await?;
        parse_mediainfo_duration(&output.stdout)
    }
}

#[async_trait]
impl MediaToolkit for ExternalToolkit {
    async fn probe_duration(
        &self,
        source: &Path,
        container: ContainerKind,
    ) -> Result<Option<f64>, JobError> {
        // ffprobe misreports growing or partial MXF; mediainfo reads the index.
        let primary = match container {
            ContainerKind::Generic => self.ffprobe_duration(source).await,
            ContainerKind::Mxf => self.mediainfo_duration(source).await,
        };
        match primary {
            Ok(Some(duration)) => return Ok(Some(duration)),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(path = %source.display(), error = %err, "primary duration probe failed");
            }
        }

        match container {
            ContainerKind::Generic => self.mediainfo_duration(source).await,
            ContainerKind::Mxf => self.ffprobe_duration(source).await,
        }
    }

    async fn extract_frame(
        &self,
        source: &Path,
        container: ContainerKind,
        at: f64,
        width: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        let seek = format!("{at:.3}");
        let mut args = quiet_args();
        match container {
            // Input seeking: fast, keyframe-accurate.
            ContainerKind::Generic => {
                args.extend([os("-ss"), os(&seek), os("-i"), os(source)]);
            }
            // Output seeking: decode from the start; robust on long-GOP MXF.
            ContainerKind::Mxf => {
                args.extend([os("-i"), os(source), os("-ss"), os(&seek)]);
            }
        }
        args.extend([
            os("-frames:v"),
            os("1"),
            os("-vf"),
            os(format!("scale={width}:-2")),
            os("-q:v"),
            os("3"),
            os(output),
        ]);
        self.run(FFMPEG, args).await.map(|_| ())
    }

    async fn tile_frames(&self, frames: &[PathBuf], output: &Path) -> Result<(), JobError> {
        let mut args = quiet_args();
        for frame in frames {
            args.extend([os("-i"), os(frame)]);
        }
        if frames.len() > 1 {
            args.extend([os("-filter_complex"), os(format!("hstack=inputs={}", frames.len()))]);
        }
        args.extend([os("-frames:v"), os("1"), os("-q:v"), os("3"), os(output)]);
        self.run(FFMPEG, args).await.map(|_| ())
    }

    async fn render_waveform(
        &self,
        source: &Path,
        layout: AudioLayout,
        width: u32,
        height: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        let filter = format!(
            "{}showwavespic=s={width}x{height}:split_channels=1",
            layout.filter_input()
        );
        let mut args = quiet_args();
        args.extend([
            os("-i"),
            os(source),
            os("-filter_complex"),
            os(filter),
            os("-frames:v"),
            os("1"),
            os(output),
        ]);
        self.run(FFMPEG, args).await.map(|_| ())
    }

    async fn analyze_loudness(
        &self,
        source: &Path,
        layout: AudioLayout,
        detail: LoudnessDetail,
    ) -> Result<String, JobError> {
        let (loglevel, framelog) = match detail {
            LoudnessDetail::Summary => ("info", "info"),
            LoudnessDetail::Frames => ("verbose", "verbose"),
        };
        let filter = format!("{}ebur128=framelog={framelog}", layout.filter_input());
        let args = [
            os("-hide_banner"),
            os("-nostats"),
            os("-loglevel"),
            os(loglevel),
            os("-i"),
            os(source),
            os("-filter_complex"),
            os(filter),
            os("-f"),
            os("null"),
            os("-"),
        ];
        let output = self.run(FFMPEG, args).await?;
        Ok(String::from_utf8_lossy(&output.stderr).into_owned())
    }

    async fn dump_metadata(
        &self,
        source: &Path,
        format: MetadataFormat,
    ) -> Result<Vec<u8>, JobError> {
        let output = self
            .run(
                FFPROBE,
                [
                    OsStr::new("-v"),
                    OsStr::new("error"),
                    OsStr::new("-show_format"),
                    OsStr::new("-show_streams"),
                    OsStr::new("-of"),
                    OsStr::new(format.writer()),
                    source.as_os_str(),
                ],
            )
            .await?;
        Ok(output.stdout)
    }

    async fn mxf_info(&self, source: &Path) -> Result<Vec<u8>, JobError> {
        let output = self
            .run(
                MXF2RAW,
                [
                    OsStr::new("--info"),
                    OsStr::new("--info-format"),
                    OsStr::new("xml"),
                    source.as_os_str(),
                ],
            )
            .await?;
        Ok(output.stdout)
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeReport {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediainfoReport {
    media: Option<MediainfoMedia>,
}

#[derive(Debug, Deserialize)]
struct MediainfoMedia {
    #[serde(default)]
    track: Vec<MediainfoTrack>,
}

#[derive(Debug, Deserialize)]
struct MediainfoTrack {
    #[serde(rename = "@type")]
    kind: String,
    #[serde(rename = "Duration")]
    duration: Option<String>,
}

/// Duration in seconds from `ffprobe -show_entries format=duration -of json`.
pub fn parse_ffprobe_duration(stdout: &[u8]) -> Result<Option<f64>, JobError> {
    let report: FfprobeReport = serde_json::from_slice(stdout).map_err(|e| JobError::Parse {
        tool: FFPROBE.to_string(),
        message: e.to_string(),
    })?;
    Ok(report
        .format
        .and_then(|f| f.duration)
        .and_then(|d| positive_seconds(&d)))
}

/// Duration in seconds of the `General` track from `mediainfo --Output=JSON`.
pub fn parse_mediainfo_duration(stdout: &[u8]) -> Result<Option<f64>, JobError> {
    let report: MediainfoReport = serde_json::from_slice(stdout).map_err(|e| JobError::Parse {
        tool: MEDIAINFO.to_string(),
        message: e.to_string(),
    })?;
    Ok(report
        .media
        .into_iter()
        .flat_map(|m| m.track)
        .find(|t| t.kind == "General")
        .and_then(|t| t.duration)
        .and_then(|d| positive_seconds(&d)))
}

fn os(arg: impl AsRef<OsStr>) -> OsString {
    arg.as_ref().to_owned()
}

/// Leading ffmpeg flags: no banner, errors only, overwrite output.
fn quiet_args() -> Vec<OsString> {
    vec![os("-hide_banner"), os("-loglevel"), os("error"), os("-y")]
}

fn positive_seconds(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("…{}", &text[start..])
}

async fn tool_present(tool: &str) -> bool {
    let flag = if tool == MEDIAINFO { "--Version" } else { "-version" };
    let present = Command::new(tool)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .is_ok();
    tracing::debug!(tool, present, "external tool check");
    present
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("clip.mxf", ContainerKind::Mxf)]
    #[case("CLIP.MXF", ContainerKind::Mxf)]
    #[case("clip.mov", ContainerKind::Generic)]
    #[case("mxf", ContainerKind::Generic)]
    fn container_kind_follows_extension(#[case] name: &str, #[case] expected: ContainerKind) {
        assert_eq!(ContainerKind::of(Path::new(name)), expected);
    }

    #[test]
    fn ffprobe_duration_is_parsed_from_format_section() {
        let json = br#"{"programs":[],"format":{"duration":"12.480000"}}"#;
        assert_eq!(parse_ffprobe_duration(json).unwrap(), Some(12.48));
    }

    #[test]
    fn ffprobe_na_duration_is_none() {
        let json = br#"{"format":{"duration":"N/A"}}"#;
        assert_eq!(parse_ffprobe_duration(json).unwrap(), None);
        assert_eq!(parse_ffprobe_duration(br#"{}"#).unwrap(), None);
    }

    #[test]
    fn ffprobe_garbage_is_a_parse_error() {
        assert!(matches!(
            parse_ffprobe_duration(b"not json"),
            Err(JobError::Parse { .. })
        ));
    }

    #[test]
    fn mediainfo_duration_comes_from_general_track() {
        let json = br#"{"media":{"@ref":"a.mxf","track":[
            {"@type":"Video","Duration":"3.000"},
            {"@type":"General","Duration":"42.040"}
        ]}}"#;
        assert_eq!(parse_mediainfo_duration(json).unwrap(), Some(42.04));
    }

    #[test]
    fn zero_duration_is_none() {
        let json = br#"{"media":{"track":[{"@type":"General","Duration":"0"}]}}"#;
        assert_eq!(parse_mediainfo_duration(json).unwrap(), None);
    }

    #[test]
    fn long_stderr_is_truncated_from_the_front() {
        let noisy = "x".repeat(STDERR_TAIL_BYTES * 2) + "final error";
        let tail = stderr_tail(noisy.as_bytes());
        assert!(tail.ends_with("final error"));
        assert!(tail.len() <= STDERR_TAIL_BYTES + '…'.len_utf8());
    }

    #[tokio::test]
    async fn missing_tool_is_reported_as_missing() {
        let toolkit = ExternalToolkit::new(Duration::from_secs(5));
        let err = toolkit
            .run("mediamirror-no-such-tool", ["--help"])
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ToolMissing { .. }));
    }
}
