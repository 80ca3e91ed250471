//! mediamirror: keep a directory of derived media artifacts in sync.
//!
//! # Usage
//!
//! ```text
//! mediamirror [--once] [--config <path>] <instance-type>
//! ```
//!
//! One process maintains one artifact kind. Exit status is 0 for help,
//! version, and a graceful finish; 1 for argument, configuration, or
//! missing-tool errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use mediamirror_core::{config, InstanceType};
use mediamirror_daemon::{start_blocking, with_bootstrap_logging, RunMode};

#[derive(Parser, Debug)]
#[command(
    name = "mediamirror",
    version,
    about = "Mirror a media directory into derived artifacts (filmstrips, waveforms, loudness reports, metadata)",
    long_about = None,
)]
struct Cli {
    /// Run a single sync and reap pass, print a JSON report, and exit.
    #[arg(long)]
    once: bool,

    /// Configuration file; overrides $MEDIAMIRROR_CONFIG and the standard locations.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Artifact kind to maintain: filmstrip, waveform, r128sum, r128log,
    /// xmlinfo, jsoninfo or mxfinfo.
    #[arg(value_name = "INSTANCE_TYPE")]
    instance_type: InstanceType,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Help and version go to stdout and are not failures.
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = with_bootstrap_logging(|| config::load(cli.config.as_deref()))
        .context("failed to load configuration")?;

    let mode = if cli.once {
        RunMode::Once
    } else {
        RunMode::Forever
    };
    let report = start_blocking(config, cli.instance_type, mode)
        .with_context(|| format!("mediamirror {} stopped with an error", cli.instance_type))?;

    if cli.once {
        println!("{}", report.to_json().context("failed to render report JSON")?);
    }
    Ok(())
}
