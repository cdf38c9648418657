mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use multimat::config::{Config, ConfigError};
use multimat::observability::{self, Metrics};
use multimat::retention::{ExpiryLedger, RetentionScheduler};

fn load_config(path: Option<PathBuf>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server(args) => {
            let config = load_config(args.config)?;
            multimat::api::run(config, args.address).await?
        }
        Commands::Sweep(args) => {
            let config = load_config(args.config)?;
            let ledger = ExpiryLedger::open(&config.storage.ledger_path)?;
            let scheduler = RetentionScheduler::new(ledger, Arc::new(Metrics::new()));

            let stats = scheduler.sweep_due(Utc::now()).await?;
            println!(
                "swept {} batches: {} files deleted, {} failures",
                stats.batches, stats.files_deleted, stats.failures
            );
        }
    }

    Ok(())
}
