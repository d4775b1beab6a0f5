use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "slotstream")]
#[command(about = "Stream whole transactions out of a Postgres logical replication slot")]
#[command(version)]
pub struct Cli {
    /// Path to the slotstream.toml config file
    #[arg(short, long, global = true, default_value = "slotstream.toml")]
    pub config: PathBuf,

    /// Environment to load (loads .env.{ENV} instead of .env)
    #[arg(short, long, global = true)]
    pub env: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the slot and print one JSON record per transaction until Ctrl-C
    Run {
        /// Milliseconds to wait after a trigger that produced nothing
        #[arg(long, default_value = "1000")]
        yield_ms: u64,
    },

    /// Print the stored checkpoint
    Checkpoint,

    /// Show the replication slot next to the stored checkpoint
    Status,
}
