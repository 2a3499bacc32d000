//! PBFT flow visualizer (headless).
//!
//! Drives the engine either from the built-in happy-path script or from a live
//! event source, printing stage transitions and log lines to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pbftviz_connector::{Connector, HttpTransport};
use pbftviz_core::Intent;
use pbftviz_runner::observer::observe;
use pbftviz_runner::{Recorder, Runner, RunnerHandle, ViewerConfig};
use pbftviz_types::{EventId, ReplicaId};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pbftviz")]
#[command(version, about = "PBFT message flow visualizer engine", long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (used when RUST_LOG is unset)
    #[arg(
        long,
        global = true,
        default_value = "warn,pbftviz_runner=info,pbftviz_scheduler=info,pbftviz_connector=info"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scripted happy-path demo
    Demo {
        /// Number of replicas
        #[arg(long)]
        n: Option<u32>,

        /// Tolerated faults (clamped to (n-1)/3)
        #[arg(long)]
        f: Option<u32>,

        /// Silent replicas (comma-separated ids)
        #[arg(long, value_delimiter = ',')]
        faulty: Vec<u32>,

        /// Scripted events per second
        #[arg(long)]
        rate: Option<u32>,

        /// Stop after this many scripted events
        #[arg(long)]
        steps: Option<u64>,
    },

    /// Follow a live event stream
    Live {
        /// Stream endpoint (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Envelopes released per second
        #[arg(long)]
        live_rate: Option<u32>,

        /// Append received envelopes to this NDJSON file
        #[arg(long)]
        record: Option<PathBuf>,

        /// Stop after this long (e.g. "30s", "5m")
        #[arg(long)]
        duration: Option<humantime::Duration>,
    },
}

/// Apply CLI overrides to the configuration.
fn apply_overrides(config: &mut ViewerConfig, command: &Commands) {
    match command {
        Commands::Demo {
            n,
            f,
            faulty,
            rate,
            ..
        } => {
            if let Some(n) = n {
                config.session.n = *n;
            }
            if let Some(f) = f {
                config.session.f = *f;
            }
            if !faulty.is_empty() {
                config.session.faulty = faulty.clone();
            }
            if let Some(rate) = rate {
                config.scheduler.rate = *rate;
            }
        }
        Commands::Live {
            url,
            live_rate,
            record,
            ..
        } => {
            if let Some(url) = url {
                config.stream.url = url.clone();
            }
            if let Some(rate) = live_rate {
                config.scheduler.live_rate = *rate;
            }
            if let Some(path) = record {
                config.stream.record = Some(path.clone());
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C");
}

async fn run_demo(handle: &RunnerHandle, config: &ViewerConfig, steps: Option<u64>) -> Result<()> {
    let session = config.session_config();
    handle
        .send(Intent::SetFaultySet {
            replicas: config.faulty_set(),
        })
        .await?;
    handle
        .send(Intent::ApplyConfig {
            n: session.n(),
            f: session.f(),
        })
        .await?;
    handle.send(Intent::Start).await?;

    match steps {
        Some(steps) => {
            let target = Some(EventId(steps));
            let mut state = handle.state();
            tokio::select! {
                result = state.wait_for(|s| s.last_eid() >= target) => {
                    result.context("Runner stopped before the demo finished")?;
                }
                _ = shutdown_signal() => {}
            }
            handle.send(Intent::Stop).await?;
        }
        None => shutdown_signal().await,
    }
    Ok(())
}

async fn run_live(handle: &RunnerHandle, duration: Option<Duration>) -> Result<()> {
    handle.send(Intent::Connect).await?;
    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!(?duration, "Duration elapsed"),
                _ = shutdown_signal() => {}
            }
        }
        None => shutdown_signal().await,
    }
    handle.send(Intent::Disconnect).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout belongs to the observer.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    apply_overrides(&mut config, &cli.command);

    let session = config.session_config();
    info!(
        n = session.n(),
        f = session.f(),
        faulty = ?config.faulty_set().iter().map(|r: &ReplicaId| r.0).collect::<Vec<_>>(),
        url = %config.stream.url,
        "Configuration loaded"
    );

    let recorder = match &config.stream.record {
        Some(path) => Some(
            Recorder::create(path)
                .with_context(|| format!("Failed to create recording {}", path.display()))?,
        ),
        None => None,
    };

    let transport =
        HttpTransport::new(config.connect_timeout()).context("Failed to build HTTP client")?;
    let connector = Connector::new(transport, config.connector_config());
    let (runner, handle, shutdown) = Runner::new(config.scheduler_config(), connector, recorder);

    let runner_task = tokio::spawn(runner.run());
    let observer_task = tokio::spawn(observe(handle.state(), std::io::stdout()));

    let result = match cli.command {
        Commands::Demo { steps, .. } => run_demo(&handle, &config, steps).await,
        Commands::Live { duration, .. } => run_live(&handle, duration.map(Into::into)).await,
    };

    shutdown.shutdown();
    runner_task.await.context("Runner task failed")?;
    observer_task.await.context("Observer task failed")?;
    result
}
