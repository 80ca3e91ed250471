use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use mediamirror_core::{Config, InstanceType};
use mediamirror_detector::Detector;
use mediamirror_jobs::toolkit::{ExternalToolkit, ToolReport};
use mediamirror_sync::{reap, run_pass, PassStats, ReapStats, SyncContext};

use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_log, LogFileWriter};

/// How many iterations [`run`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One sync pass and one reap, then return.
    Once,
    /// Repeat every `poll_interval` until the stop signal fires.
    Forever,
}

/// Outcome of one iteration. `None` means that half of the iteration failed
/// as a whole (e.g. an unreadable directory) and was logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationReport {
    pub iteration: u64,
    pub kind: InstanceType,
    pub pass: Option<PassStats>,
    pub reap: Option<ReapStats>,
}

impl IterationReport {
    pub fn to_json(&self) -> Result<String, DaemonError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Initialise logging, check tools, and run the scheduler to completion on a
/// current-thread runtime.
pub fn start_blocking(
    config: Config,
    kind: InstanceType,
    mode: RunMode,
) -> Result<IterationReport, DaemonError> {
    init_tracing(&config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(start(config, kind, mode))
}

async fn start(
    config: Config,
    kind: InstanceType,
    mode: RunMode,
) -> Result<IterationReport, DaemonError> {
    let toolkit = ExternalToolkit::new(config.job_timeout);
    preflight(&toolkit).await?;

    let detector = Detector::new();
    if !detector.lsof_available().await {
        tracing::warn!("lsof not found; write detection falls back to size sampling");
    }

    tracing::info!(
        kind = %kind,
        source = %config.source_dir.display(),
        destination = %config.dest_dir.display(),
        config = ?config.origin,
        "mediamirror starting",
    );

    let ctx = SyncContext::new(Arc::new(config), kind, Arc::new(toolkit), Arc::new(detector));
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
    let signal_handle = tokio::spawn(async move {
        if let Err(err) = forward_stop_signals(shutdown_tx).await {
            tracing::error!(error = %err, "signal handling unavailable; stop the process with SIGKILL");
        }
    });

    let result = run(&ctx, mode, shutdown_rx).await;
    signal_handle.abort();
    result
}

/// Refuse to start without the required tools; warn about optional ones.
pub async fn preflight(toolkit: &ExternalToolkit) -> Result<ToolReport, DaemonError> {
    let report = toolkit.preflight().await;
    for tool in &report.missing_optional {
        tracing::warn!(tool, "optional tool not found; dependent jobs will fail");
    }
    if !report.is_usable() {
        return Err(DaemonError::MissingTools {
            tools: report.missing_required.clone(),
        });
    }
    Ok(report)
}

/// Scheduler loop: sync, reap, then wait for the next poll or a stop signal.
///
/// The stop signal is only observed between iterations; a pass in progress
/// always completes. Returns the report of the last iteration.
pub async fn run(
    ctx: &SyncContext,
    mode: RunMode,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<IterationReport, DaemonError> {
    let mut iteration = 0;
    let mut stop_source = true;
    loop {
        iteration += 1;
        let report = run_iteration(ctx, iteration).await;
        rotate_log(ctx.config.log_file.as_deref());

        if mode == RunMode::Once {
            return Ok(report);
        }

        let pause = tokio::time::sleep(ctx.config.poll_interval);
        tokio::pin!(pause);
        loop {
            tokio::select! {
                _ = &mut pause => break,
                received = shutdown_rx.recv(), if stop_source => match received {
                    Ok(()) | Err(RecvError::Lagged(_)) => {
                        tracing::info!(iterations = iteration, "stop requested, shutting down");
                        return Ok(report);
                    }
                    // Every sender is gone: nothing can ask us to stop any more.
                    Err(RecvError::Closed) => {
                        tracing::warn!("stop signal source closed; polling continues");
                        stop_source = false;
                    }
                },
            }
        }
    }
}

/// One sync pass followed by one reap. Never fails; errors are logged.
pub async fn run_iteration(ctx: &SyncContext, iteration: u64) -> IterationReport {
    tracing::info!(iteration, kind = %ctx.kind, "iteration started");

    let pass = match run_pass(ctx).await {
        Ok(stats) => Some(stats),
        Err(err) => {
            tracing::error!(error = %err, "sync pass aborted");
            None
        }
    };

    let reap = match reap(&ctx.config, ctx.entry().extension).await {
        Ok(stats) => Some(stats),
        Err(err) => {
            tracing::error!(error = %err, "reap aborted");
            None
        }
    };

    tracing::info!(iteration, "iteration finished");
    IterationReport {
        iteration,
        kind: ctx.kind,
        pass,
        reap,
    }
}

/// Send one stop message on SIGINT or SIGTERM.
async fn forward_stop_signals(shutdown_tx: broadcast::Sender<()>) -> Result<(), DaemonError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).map_err(DaemonError::Signal)?;
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(DaemonError::Signal)?;
                tracing::info!("received ctrl-c");
            }
            _ = terminate.recv() => {
                tracing::info!("received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(DaemonError::Signal)?;
        tracing::info!("received ctrl-c");
    }

    let _ = shutdown_tx.send(());
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `LOG_LEVEL`; with
/// `LOG_FILE` set, output goes to that file without colours.
pub fn init_tracing(config: &Config) -> Result<(), DaemonError> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);

    // try_init fails only when a subscriber is already installed.
    let _ = match &config.log_file {
        Some(path) => {
            let writer = LogFileWriter::open(path).map_err(|e| io_err(path, e))?;
            writer.register();
            builder.with_ansi(false).with_writer(writer).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    Ok(())
}

/// Run `f` with a temporary stderr subscriber at `warn`, for work that
/// happens before configuration (and therefore [`init_tracing`]) is known.
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> T {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt()
        .with_env_filter(EnvFilter::new("warn"))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}
