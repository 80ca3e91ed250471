//! Audio artifacts: waveform image and EBU R128 loudness reports.
//!
//! Broadcast sources often carry split-mono audio on two streams, so every
//! procedure first tries [`AudioLayout::DualTrack`] and falls back to
//! [`AudioLayout::SingleTrack`] when that attempt fails.

use std::path::Path;

use crate::error::JobError;
use crate::filmstrip::FILMSTRIP_FRAMES;
use crate::registry::{JobContext, JobFuture};
use crate::staging::{publish, remove_if_present, staged_path, write_staged, Scratch};
use crate::toolkit::{AudioLayout, LoudnessDetail};

/// Height of the waveform image in pixels.
pub const WAVEFORM_HEIGHT: u32 = 240;

const SUMMARY_MARKER: &str = "Summary:";

pub fn run_waveform<'a>(
    ctx: &'a JobContext,
    source: &'a Path,
    destination: &'a Path,
) -> JobFuture<'a> {
    Box::pin(waveform(ctx, source, destination))
}

pub fn run_r128_summary<'a>(
    ctx: &'a JobContext,
    source: &'a Path,
    destination: &'a Path,
) -> JobFuture<'a> {
    Box::pin(loudness(ctx, source, destination, LoudnessDetail::Summary))
}

pub fn run_r128_log<'a>(
    ctx: &'a JobContext,
    source: &'a Path,
    destination: &'a Path,
) -> JobFuture<'a> {
    Box::pin(loudness(ctx, source, destination, LoudnessDetail::Frames))
}

/// Waveform width: the full filmstrip width, so both timelines line up.
pub fn waveform_width(image_width: u32) -> u32 {
    image_width.saturating_mul(FILMSTRIP_FRAMES as u32)
}

async fn waveform(ctx: &JobContext, source: &Path, destination: &Path) -> Result<(), JobError> {
    let mut scratch = Scratch::new();
    let staged = scratch.track(staged_path(&ctx.temp_dir, destination));
    let width = waveform_width(ctx.image_width);

    let dual = ctx
        .tools
        .render_waveform(source, AudioLayout::DualTrack, width, WAVEFORM_HEIGHT, &staged)
        .await;
    if let Err(err) = dual {
        tracing::debug!(path = %source.display(), error = %err, "dual-track waveform failed, retrying single-track");
        remove_if_present(&staged);
        ctx.tools
            .render_waveform(source, AudioLayout::SingleTrack, width, WAVEFORM_HEIGHT, &staged)
            .await?;
    }

    publish(&staged, destination)
}

async fn loudness(
    ctx: &JobContext,
    source: &Path,
    destination: &Path,
    detail: LoudnessDetail,
) -> Result<(), JobError> {
    let report = match ctx
        .tools
        .analyze_loudness(source, AudioLayout::DualTrack, detail)
        .await
    {
        Ok(report) => report,
        Err(err) => {
            tracing::debug!(path = %source.display(), error = %err, "dual-track loudness failed, retrying single-track");
            ctx.tools
                .analyze_loudness(source, AudioLayout::SingleTrack, detail)
                .await?
        }
    };

    let text = match detail {
        LoudnessDetail::Summary => extract_summary(&report),
        LoudnessDetail::Frames => extract_frame_log(&report),
    }?;

    let mut scratch = Scratch::new();
    let staged = scratch.track(staged_path(&ctx.temp_dir, destination));
    write_staged(&staged, text.as_bytes())?;
    publish(&staged, destination)
}

// ---------------------------------------------------------------------------
// Report extraction
// ---------------------------------------------------------------------------

/// Everything from the `Summary:` line to the end of the analyser log.
pub fn extract_summary(report: &str) -> Result<String, JobError> {
    let mut lines = report.lines().skip_while(|line| !line.contains(SUMMARY_MARKER));
    let Some(first) = lines.next() else {
        return Err(JobError::MissingSection { section: "summary" });
    };

    let mut out = String::new();
    for line in std::iter::once(first).chain(lines) {
        out.push_str(strip_filter_prefix(line));
        out.push('\n');
    }
    Ok(out)
}

/// Every per-frame measurement line of the analyser log.
pub fn extract_frame_log(report: &str) -> Result<String, JobError> {
    let mut out = String::new();
    for line in report
        .lines()
        .filter(|line| line.contains(" t:") && line.contains(" M:"))
    {
        out.push_str(strip_filter_prefix(line));
        out.push('\n');
    }
    if out.is_empty() {
        return Err(JobError::MissingSection {
            section: "per-frame measurements",
        });
    }
    Ok(out)
}

/// Drop ffmpeg's `[Parsed_ebur128_0 @ 0x…] ` line prefix.
fn strip_filter_prefix(line: &str) -> &str {
    if !line.starts_with('[') {
        return line;
    }
    match line.find("] ") {
        Some(end) => &line[end + 2..],
        None => line,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
