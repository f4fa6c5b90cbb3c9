use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pushstore::{open_backend, NodeRouter, OfflineStorage, StorageConfig};

#[derive(Parser)]
#[command(name = "pushstored", about = "Offline message storage daemon", version)]
struct Cli {
    /// Path to the storage config (TOML).
    #[arg(short, long, default_value = "pushstore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Open the backend and run the expiry sweeper until Ctrl-C (default).
    Run,

    /// Run one expiry sweep across every node and exit.
    Sweep,

    /// Print the node that owns each key.
    Route {
        /// Sharding keys to resolve.
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = StorageConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Sweep => sweep(&config).await,
        Command::Route { keys } => route(&config, &keys),
    }
}

async fn run(config: &StorageConfig) -> anyhow::Result<()> {
    let storage = OfflineStorage::open(config).await?;
    tracing::info!(
        "pushstored v{} serving {:?} backend ({} node(s), sweeper {})",
        env!("CARGO_PKG_VERSION"),
        storage.kind(),
        config.nodes.len(),
        if storage.has_sweeper() { "on" } else { "off" },
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("shutting down");
    storage.shutdown().await;
    Ok(())
}

async fn sweep(config: &StorageConfig) -> anyhow::Result<()> {
    let storage = open_backend(config).await?;
    let report = storage.del_all_expired().await?;
    eprintln!(
        "removed {} expired message(s) across {} node(s)",
        report.removed, report.nodes
    );
    Ok(())
}

fn route(config: &StorageConfig, keys: &[String]) -> anyhow::Result<()> {
    let router = NodeRouter::new(config.nodes.keys().cloned(), config.ring_weight)?;
    for key in keys {
        println!("{key}\t{}", router.resolve(key)?);
    }
    Ok(())
}
