use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use slotstream_config::ReplicationConfig;
use tracing::info;

mod cli;
mod commands;
mod env;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the records
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("slotstream=info".parse()?),
        )
        .init();

    env::load_dotenv(cli.env.as_deref())?;

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run { yield_ms } => commands::cmd_run(config, yield_ms).await,
        Commands::Checkpoint => commands::cmd_checkpoint(&config),
        Commands::Status => commands::cmd_status(&config).await,
    }
}

fn load_config(path: &Path) -> Result<ReplicationConfig> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return ReplicationConfig::parse("").context("Invalid default configuration");
    }

    ReplicationConfig::from_file(path)
        .with_context(|| format!("Failed to load config file: {}", path.display()))
}
