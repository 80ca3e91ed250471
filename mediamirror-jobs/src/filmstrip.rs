//! Filmstrip: eleven frames across the timeline, tiled left to right.
//!
//! Frames are taken at 0%, 10%, … 90% of the duration and at a position
//! backed off from the very end (decoders often fail on the last frame).
//! Every frame is a separate tool call; the strip is only tiled when all of
//! them succeed, unless missing frames are tolerated.

use std::path::Path;

use crate::error::JobError;
use crate::registry::{JobContext, JobFuture};
use crate::staging::{ensure_output, frame_path, publish, staged_path, Scratch};
use crate::toolkit::ContainerKind;

/// Number of frames in a filmstrip.
pub const FILMSTRIP_FRAMES: usize = 11;

/// How far before the end the last frame is taken, at most.
pub const END_BACKOFF_SECS: f64 = 1.0;

/// Share of the duration the last frame backs off on short clips.
const END_BACKOFF_FRACTION: f64 = 0.05;

/// Seek positions, in seconds, for a clip of `duration` seconds.
pub fn frame_offsets(duration: f64) -> [f64; FILMSTRIP_FRAMES] {
    let mut offsets = [0.0; FILMSTRIP_FRAMES];
    for (i, slot) in offsets.iter_mut().enumerate().take(FILMSTRIP_FRAMES - 1) {
        *slot = duration * i as f64 / 10.0;
    }
    // Always strictly between the 90% frame and the end.
    offsets[FILMSTRIP_FRAMES - 1] = duration - END_BACKOFF_SECS.min(duration * END_BACKOFF_FRACTION);
    offsets
}

pub fn run<'a>(ctx: &'a JobContext, source: &'a Path, destination: &'a Path) -> JobFuture<'a> {
    Box::pin(filmstrip(ctx, source, destination))
}

async fn filmstrip(ctx: &JobContext, source: &Path, destination: &Path) -> Result<(), JobError> {
    let container = ContainerKind::of(source);
    let duration = match ctx.tools.probe_duration(source, container).await? {
        Some(duration) if duration.is_finite() && duration > 0.0 => duration,
        _ => {
            return Err(JobError::NoDuration {
                path: source.to_path_buf(),
            })
        }
    };

    let mut scratch = Scratch::new();
    let mut frames = Vec::with_capacity(FILMSTRIP_FRAMES);

    for (index, at) in frame_offsets(duration).into_iter().enumerate() {
        let frame = scratch.track(frame_path(&ctx.temp_dir, destination, index));
        let extracted = ctx
            .tools
            .extract_frame(source, container, at, ctx.image_width, &frame)
            .await
            .and_then(|()| ensure_output(&frame));
        match extracted {
            Ok(_) => frames.push(frame),
            Err(err) => {
                tracing::warn!(
                    path = %source.display(),
                    frame = index,
                    at,
                    error = %err,
                    "frame extraction failed",
                );
            }
        }
    }

    let complete = frames.len() == FILMSTRIP_FRAMES;
    let tolerated = ctx.allow_missing_frames && !frames.is_empty();
    if !complete && !tolerated {
        return Err(JobError::FramesMissing {
            extracted: frames.len(),
            expected: FILMSTRIP_FRAMES,
        });
    }
    if !complete {
        tracing::info!(
            path = %source.display(),
            extracted = frames.len(),
            "tiling filmstrip with missing frames",
        );
    }

    let staged = scratch.track(staged_path(&ctx.temp_dir, destination));
    ctx.tools.tile_frames(&frames, &staged).await?;
    publish(&staged, destination)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
