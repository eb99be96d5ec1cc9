use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pasta_server::{Pastes, StorageBackend};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "pastad",
    about = "Pastad: zero-knowledge paste server daemon",
    version
)]
struct Cli {
    /// Log level: error, warn, info, debug, verbose (default: $PASTA_LOG_LEVEL or warn)
    #[arg(long, env = "PASTA_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Data directory (default: $PASTA_DATA_DIR or the platform data dir)
    #[arg(long, env = "PASTA_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Pasta HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "PASTA_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind
        #[arg(long, env = "PASTA_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Storage backend: redb or memory
        #[arg(long, env = "PASTA_STORAGE", default_value = "redb")]
        storage: StorageBackend,
        /// How often expired pastes are swept, e.g. "5m" or "1h"
        #[arg(long, env = "PASTA_SWEEP_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
        sweep_interval: Duration,
    },
    /// Delete expired pastes from the database once and exit.
    Prune {
        /// Storage backend the server is configured with
        #[arg(long, env = "PASTA_STORAGE", default_value = "redb")]
        storage: StorageBackend,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let raw = cli.log_level.clone().unwrap_or_else(|| "warn".into());
    let effective_log_level = if raw.eq_ignore_ascii_case("verbose") {
        "debug".to_owned()
    } else {
        raw
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&effective_log_level))
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            storage,
            sweep_interval,
        } => cmd_serve(host, port, storage, sweep_interval, cli.data_dir).await,

        Commands::Prune { storage } => cmd_prune(storage, cli.data_dir),
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(
    host: String,
    port: u16,
    storage: StorageBackend,
    sweep_interval: Duration,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let cfg = pasta_server::ServerConfig {
        host,
        port,
        storage,
        sweep_interval,
        data_dir,
        ..Default::default()
    };

    pasta_server::run(cfg).await
}

fn cmd_prune(storage: StorageBackend, data_dir: Option<PathBuf>) -> Result<()> {
    if let Some(note) = offline_prune_note(storage) {
        println!("{note}");
        return Ok(());
    }
    let store = pasta_server::open_store(StorageBackend::Redb, data_dir.as_ref())?;
    let removed = Pastes::new(store).prune()?;
    info!(removed, "offline prune complete");
    println!("removed {removed} expired paste(s)");
    Ok(())
}

/// A memory-backed server keeps nothing on disk for an offline prune to touch.
fn offline_prune_note(storage: StorageBackend) -> Option<&'static str> {
    match storage {
        StorageBackend::Memory => Some(
            "PASTA_STORAGE=memory: nothing is persisted, so there is nothing to prune; \
             the running server sweeps its own memory",
        ),
        StorageBackend::Redb => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_skips_memory_backend() {
        assert!(offline_prune_note(StorageBackend::Memory).is_some());
        assert!(offline_prune_note(StorageBackend::Redb).is_none());
    }

    #[test]
    fn prune_reads_storage_flag() {
        let cli = Cli::try_parse_from(["pastad", "prune", "--storage", "memory"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Prune {
                storage: StorageBackend::Memory
            }
        ));
    }
}
