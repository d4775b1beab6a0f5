use anyhow::{Context, Result};
use colored::Colorize;
use slotstream_config::ReplicationConfig;
use slotstream_state::{CheckpointStore, FileCheckpointStore};

pub fn cmd_checkpoint(config: &ReplicationConfig) -> Result<()> {
    let store = FileCheckpointStore::new(config.checkpoint.path.clone());

    if store.path().is_none() {
        println!(
            "{}",
            "No checkpoint file configured. Set [checkpoint] path in slotstream.toml.".yellow()
        );
        return Ok(());
    }

    match store.load().context("Failed to read checkpoint")? {
        Some(lsn) => println!("{}", lsn),
        None => println!("No checkpoint stored at {}", store.describe()),
    }

    Ok(())
}
