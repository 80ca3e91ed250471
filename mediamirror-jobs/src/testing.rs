//! In-process [`MediaToolkit`] for tests.
//!
//! `FakeToolkit` writes small placeholder files instead of running external
//! tools, records every call, and can be told to fail specific operations.
//! Enabled for this crate's tests and, through the `testing` feature, for
//! downstream crates' tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::JobError;
use crate::toolkit::{
    AudioLayout, ContainerKind, LoudnessDetail, MediaToolkit, MetadataFormat, FFMPEG, FFPROBE,
    MXF2RAW,
};

/// A recorded toolkit invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ProbeDuration { container: ContainerKind },
    ExtractFrame { container: ContainerKind, index: Option<usize> },
    TileFrames { count: usize },
    RenderWaveform { layout: AudioLayout, width: u32 },
    AnalyzeLoudness { layout: AudioLayout, detail: LoudnessDetail },
    DumpMetadata { format: MetadataFormat },
    MxfInfo,
}

const DEFAULT_REPORT: &str = "\
[Parsed_ebur128_0 @ 0x5610] t: 0.1      TARGET:-23 LUFS    M: -25.0 S:-120.7     I: -25.0 LUFS
[Parsed_ebur128_0 @ 0x5610] Summary:

  Integrated loudness:
    I:         -23.0 LUFS
";

#[derive(Debug)]
pub struct FakeToolkit {
    duration: Option<f64>,
    failing_frames: HashSet<usize>,
    dual_track: bool,
    loudness_report: String,
    mxf_tool: bool,
    fail_tile: bool,
    fail_all: bool,
    calls: Mutex<Vec<ToolCall>>,
}

impl Default for FakeToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeToolkit {
    /// Everything succeeds; sources last ten seconds.
    pub fn new() -> Self {
        Self {
            duration: Some(10.0),
            failing_frames: HashSet::new(),
            dual_track: true,
            loudness_report: DEFAULT_REPORT.to_string(),
            mxf_tool: true,
            fail_tile: false,
            fail_all: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    /// Make extraction of filmstrip frame `index` fail.
    pub fn failing_frame(mut self, index: usize) -> Self {
        self.failing_frames.insert(index);
        self
    }

    /// Sources have a single audio stream; dual-track calls fail.
    pub fn without_dual_track(mut self) -> Self {
        self.dual_track = false;
        self
    }

    pub fn with_loudness_report(mut self, report: &str) -> Self {
        self.loudness_report = report.to_string();
        self
    }

    pub fn without_mxf_tool(mut self) -> Self {
        self.mxf_tool = false;
        self
    }

    pub fn failing_tile(mut self) -> Self {
        self.fail_tile = true;
        self
    }

    /// Every operation fails as if the tool exited non-zero.
    pub fn failing_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Calls recorded so far, in order.
    pub fn calls(&self) -> Vec<ToolCall> {
        self.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ToolCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ToolCall) -> Result<(), JobError> {
        self.lock().push(call);
        if self.fail_all {
            return Err(failed(FFMPEG));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe_duration(
        &self,
        _source: &Path,
        container: ContainerKind,
    ) -> Result<Option<f64>, JobError> {
        self.record(ToolCall::ProbeDuration { container })?;
        Ok(self.duration)
    }

    async fn extract_frame(
        &self,
        _source: &Path,
        container: ContainerKind,
        _at: f64,
        _width: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        let index = frame_index(output);
        self.record(ToolCall::ExtractFrame { container, index })?;
        if index.is_some_and(|i| self.failing_frames.contains(&i)) {
            return Err(failed(FFMPEG));
        }
        write_placeholder(output, b"\xff\xd8frame")
    }

    async fn tile_frames(&self, frames: &[PathBuf], output: &Path) -> Result<(), JobError> {
        self.record(ToolCall::TileFrames {
            count: frames.len(),
        })?;
        if self.fail_tile {
            return Err(failed(FFMPEG));
        }
        write_placeholder(output, b"\xff\xd8strip")
    }

    async fn render_waveform(
        &self,
        _source: &Path,
        layout: AudioLayout,
        width: u32,
        _height: u32,
        output: &Path,
    ) -> Result<(), JobError> {
        self.record(ToolCall::RenderWaveform { layout, width })?;
        if layout == AudioLayout::DualTrack && !self.dual_track {
            return Err(failed(FFMPEG));
        }
        write_placeholder(output, b"GIF89a")
    }

    async fn analyze_loudness(
        &self,
        _source: &Path,
        layout: AudioLayout,
        detail: LoudnessDetail,
    ) -> Result<String, JobError> {
        self.record(ToolCall::AnalyzeLoudness { layout, detail })?;
        if layout == AudioLayout::DualTrack && !self.dual_track {
            return Err(failed(FFMPEG));
        }
        Ok(self.loudness_report.clone())
    }

    async fn dump_metadata(
        &self,
        _source: &Path,
        format: MetadataFormat,
    ) -> Result<Vec<u8>, JobError> {
        self.record(ToolCall::DumpMetadata { format })
            .map_err(|_| failed(FFPROBE))?;
        Ok(match format {
            MetadataFormat::Xml => b"<ffprobe><format/></ffprobe>\n".to_vec(),
            MetadataFormat::Json => b"{\"format\":{}}\n".to_vec(),
        })
    }

    async fn mxf_info(&self, _source: &Path) -> Result<Vec<u8>, JobError> {
        self.record(ToolCall::MxfInfo)?;
        if !self.mxf_tool {
            return Err(JobError::ToolMissing {
                tool: MXF2RAW.to_string(),
            });
        }
        Ok(b"<MXFInfo/>\n".to_vec())
    }
}

fn failed(tool: &str) -> JobError {
    JobError::ToolFailed {
        tool: tool.to_string(),
        status: "exit status: 1".to_string(),
        stderr: "simulated failure".to_string(),
    }
}

fn write_placeholder(output: &Path, bytes: &[u8]) -> Result<(), JobError> {
    fs::write(output, bytes).map_err(|source| JobError::Io {
        path: output.to_path_buf(),
        source,
    })
}

/// Frame number from a `<base>.frameNN.jpg` scratch name.
fn frame_index(output: &Path) -> Option<usize> {
    let stem = output.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once(".frame")?;
    digits.parse().ok()
}
