//! Metadata dumps: ffprobe XML/JSON and MXF container info.

use std::path::Path;

use crate::error::JobError;
use crate::registry::{JobContext, JobFuture};
use crate::staging::{publish, staged_path, write_staged, Scratch};
use crate::toolkit::{ContainerKind, MetadataFormat};

pub fn run_xml<'a>(ctx: &'a JobContext, source: &'a Path, destination: &'a Path) -> JobFuture<'a> {
    Box::pin(dump(ctx, source, destination, MetadataFormat::Xml))
}

pub fn run_json<'a>(ctx: &'a JobContext, source: &'a Path, destination: &'a Path) -> JobFuture<'a> {
    Box::pin(dump(ctx, source, destination, MetadataFormat::Json))
}

pub fn run_mxf<'a>(ctx: &'a JobContext, source: &'a Path, destination: &'a Path) -> JobFuture<'a> {
    Box::pin(mxf(ctx, source, destination))
}

async fn dump(
    ctx: &JobContext,
    source: &Path,
    destination: &Path,
    format: MetadataFormat,
) -> Result<(), JobError> {
    let bytes = ctx.tools.dump_metadata(source, format).await?;
    stage_and_publish(ctx, destination, &bytes)
}

async fn mxf(ctx: &JobContext, source: &Path, destination: &Path) -> Result<(), JobError> {
    if ContainerKind::of(source) != ContainerKind::Mxf {
        return Err(JobError::UnsupportedFormat {
            path: source.to_path_buf(),
        });
    }
    let bytes = ctx.tools.mxf_info(source).await?;
    stage_and_publish(ctx, destination, &bytes)
}

fn stage_and_publish(ctx: &JobContext, destination: &Path, bytes: &[u8]) -> Result<(), JobError> {
    let mut scratch = Scratch::new();
    let staged = scratch.track(staged_path(&ctx.temp_dir, destination));
    write_staged(&staged, bytes)?;
    publish(&staged, destination)
}
