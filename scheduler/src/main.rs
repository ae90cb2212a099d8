// Orchestrator entry point
//
// `serve` (default) supervises the trending service, exposes the control API
// and runs the cadence scheduler until Ctrl+C. `run-once` performs a single
// digest inline.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use common::bootstrap;
use common::config::Settings;
use common::models::Cadence;
use common::runner::{JobRunner, JobTrigger, SpawningTrigger};
use common::schedule::default_rules;
use common::scheduler::{Scheduler, SchedulerEngine};
use common::store::ConfigStore;
use common::supervisor::DependentServiceSupervisor;
use common::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "trending-digest", version, about = "Scheduled GitHub trending digests")]
struct Cli {
    /// Directory holding default.toml and local.toml
    #[arg(long, default_value = "config", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler and control API until interrupted
    Serve,
    /// Fetch and publish one digest, then exit
    RunOnce {
        /// daily, weekly or monthly
        #[arg(long)]
        since: Cadence,
        /// Language filter; defaults to the stored language
        #[arg(long)]
        language: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from_path(&cli.config_dir)
        .with_context(|| format!("Failed to load settings from {}", cli.config_dir.display()))?;
    settings.validate().context("Invalid settings")?;

    telemetry::init_logging(
        &settings.observability.log_level,
        &settings.observability.log_format,
    )?;
    if let Some(port) = settings.observability.metrics_port {
        telemetry::init_metrics(port)?;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings).await,
        Command::RunOnce { since, language } => run_once(settings, since, language).await,
    }
}

async fn serve(settings: Settings) -> Result<()> {
    info!("Starting trending digest orchestrator");

    // Installed before anything is launched so Ctrl+C always reaches cleanup
    let shutdown = listen_for_shutdown();

    let store = bootstrap::init_config_store(&settings).await?;

    let supervisor = DependentServiceSupervisor::from_config(&settings.dependent_service)
        .with_shutdown_signal(shutdown.clone());
    let handle = bootstrap::init_dependent_service(&settings, &supervisor).await;

    let result = if *shutdown.borrow() {
        info!("Shutdown requested during startup");
        Ok(())
    } else {
        run_services(&settings, store, shutdown).await
    };

    if let Err(e) = supervisor.shutdown(handle).await {
        error!(error = %e, "Failed to terminate dependent service");
    }

    match &result {
        Ok(()) => info!("Orchestrator stopped"),
        Err(e) => error!(error = %e, "Orchestrator failed"),
    }
    result
}

/// Flips to `true` on the first Ctrl+C
fn listen_for_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C, stopping");
        } else {
            info!("Received Ctrl+C signal, initiating graceful shutdown");
        }
        let _ = tx.send(true);
    });
    rx
}

/// Control API plus scheduler; returns once the scheduler loop has stopped
/// and every digest it or the API started has finished
async fn run_services(
    settings: &Settings,
    store: Arc<ConfigStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let runner = bootstrap::init_job_runner(settings, store.clone())?;
    let jobs = Arc::new(SpawningTrigger::new(runner));
    let trigger: Arc<dyn JobTrigger> = jobs.clone();

    let address = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind control API on {}", address))?;

    let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
    let state = api::AppState::new(store, trigger.clone());
    let mut server = tokio::spawn(api::serve(listener, state, async move {
        let _ = server_stop_rx.await;
    }));

    let engine = Arc::new(SchedulerEngine::new(settings.scheduler.clone(), trigger));
    engine.arm(default_rules(&settings.scheduler)?, Utc::now());

    let engine_for_signal = engine.clone();
    tokio::spawn(async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
        if let Err(e) = engine_for_signal.stop().await {
            error!(error = %e, "Error during scheduler shutdown");
        }
    });

    let server_exit = tokio::select! {
        stopped = engine.start() => {
            stopped.map_err(|e| anyhow::anyhow!("Scheduler error: {}", e)).map(|()| None)
        }
        served = &mut server => Ok(Some(served)),
    };

    let outcome = match server_exit {
        Ok(None) => {
            let _ = server_stop_tx.send(());
            server
                .await
                .context("Control API task panicked")
                .and_then(|served| served)
        }
        Ok(Some(served)) => {
            // The listener only returns early on failure
            if let Err(e) = engine.stop().await {
                error!(error = %e, "Error during scheduler shutdown");
            }
            served
                .context("Control API task panicked")
                .and_then(|served| served)
                .and_then(|()| Err(anyhow::anyhow!("Control API stopped unexpectedly")))
        }
        Err(e) => {
            let _ = server_stop_tx.send(());
            Err(e)
        }
    };

    jobs.drain().await;
    outcome
}

async fn run_once(settings: Settings, cadence: Cadence, language: Option<String>) -> Result<()> {
    let store = bootstrap::init_config_store(&settings).await?;

    let supervisor = DependentServiceSupervisor::from_config(&settings.dependent_service);
    let handle = bootstrap::init_dependent_service(&settings, &supervisor).await;

    let runner: Arc<JobRunner> = bootstrap::init_job_runner(&settings, store)?;
    let result = match language {
        Some(language) => runner.run_with(cadence, Some(language)).await,
        None => runner.run(cadence).await,
    };

    if let Err(e) = supervisor.shutdown(handle).await {
        error!(error = %e, "Failed to terminate dependent service");
    }

    let report = result.context("Digest run failed")?;
    info!(
        repositories = report.repositories,
        published = report.published,
        failed = report.failed,
        "Digest run complete"
    );
    Ok(())
}
