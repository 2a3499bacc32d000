//! Happy-path PBFT event source.
//!
//! Serves `GET /stream` (NDJSON, `?from_eid=K` to resume) and `GET /health`.
//! With `--replay`, plays back a recording made by `pbftviz live --record`.

use anyhow::{Context, Result};
use clap::Parser;
use pbftviz_source::{Feed, Recording, SourceConfig, SourceServer};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pbftviz-source")]
#[command(version, about = "Happy-path PBFT event source", long_about = None)]
struct Cli {
    /// Number of replicas
    #[arg(long, default_value = "4")]
    n: u32,

    /// Envelopes emitted per second
    #[arg(long, default_value = "3")]
    eps: u32,

    /// Play back this NDJSON recording instead of generating rounds
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8002")]
    listen: String,

    /// Log level filter (used when RUST_LOG is unset)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let listen: SocketAddr = cli
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address: {}", cli.listen))?;

    let config = SourceConfig::default()
        .with_listen_addr(listen)
        .with_n(cli.n)
        .with_eps(cli.eps);

    let feed = match &cli.replay {
        Some(path) => Feed::Replay(
            Recording::load(path)
                .with_context(|| format!("Failed to load recording {}", path.display()))?,
        ),
        None => Feed::Generated,
    };

    let handle = SourceServer::new(config)
        .with_feed(feed)
        .start()
        .await
        .context("Failed to start event source")?;

    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");
    handle.abort();
    Ok(())
}
