//! Courier - priority task dispatcher
//!
//! CLI entry point: loads config, wires the in-process app, submits tasks and
//! runs the worker.

mod cli;
mod tasks;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result, eyre};
use tracing::info;

use courier_core::actions::register_builtins;
use courier_core::impls::WindowRateGate;
use courier_core::ports::RateGate;
use courier_core::{App, AppBuilder, CourierConfig};

use crate::cli::{Cli, Command};
use crate::tasks::load_tasks;

const IDLE_POLL: Duration = Duration::from_millis(500);

fn setup_logging(verbose: bool) -> Result<()> {
    // stdout is reserved for the status report
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {e}"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = CourierConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Run { tasks, until_idle } => cmd_run(config, tasks, until_idle).await,
        Command::Config => cmd_config(&config),
    }
}

async fn cmd_run(config: CourierConfig, tasks: Option<PathBuf>, until_idle: bool) -> Result<()> {
    let gate: Arc<dyn RateGate> = Arc::new(WindowRateGate::from_config(&config.rate_limit));
    let builder = register_builtins(AppBuilder::new().config(config.clone()), gate, &config.actions)
        .context("Failed to register actions")?;
    let app = builder.build().context("Failed to build app")?;

    let handle = app.start().await.context("Failed to start worker")?;

    if let Some(path) = tasks {
        let definitions = load_tasks(&path)?;
        info!("Submitting {} task(s) from {}", definitions.len(), path.display());
        for (n, new) in definitions.into_iter().enumerate() {
            app.submitter()
                .create_task(new)
                .await
                .with_context(|| format!("Failed to submit task #{n} from {}", path.display()))?;
        }
    }

    if until_idle {
        wait_until_idle(&app).await?;
    } else {
        info!("Running until Ctrl-C");
        tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    }

    info!("Shutting down");
    handle.shutdown_and_join().await.context("Worker stopped with an error")?;

    let report = app.status().await.context("Failed to collect status")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn wait_until_idle(app: &App) -> Result<()> {
    loop {
        let report = app.status().await.context("Failed to collect status")?;
        if report.is_idle() {
            info!("No open tasks left");
            return Ok(());
        }
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted with {} open task(s)", report.counts.open());
                return Ok(());
            }
            _ = tokio::time::sleep(IDLE_POLL) => {}
        }
    }
}

fn cmd_config(config: &CourierConfig) -> Result<()> {
    print!("{}", config.to_yaml()?);
    Ok(())
}
