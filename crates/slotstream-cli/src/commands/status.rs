use anyhow::{Context, Result};
use colored::Colorize;
use slotstream_config::ReplicationConfig;
use slotstream_core::Lsn;
use slotstream_pg::replication::slot_status;
use slotstream_pg::{ConnectParams, ConnectionManager};
use slotstream_state::{CheckpointStore, FileCheckpointStore};
use tracing::warn;

pub async fn cmd_status(config: &ReplicationConfig) -> Result<()> {
    let store = FileCheckpointStore::new(config.checkpoint.path.clone());
    let checkpoint = match store.load() {
        Ok(lsn) => lsn,
        Err(e) => {
            warn!(error = %e, "Could not read checkpoint");
            None
        }
    };

    let mut connection = ConnectionManager::new(ConnectParams::from_config(config));
    let client = connection
        .get_connection()
        .await
        .context("Failed to connect to Postgres")?;

    let status = slot_status(client, &config.source.slot).await?;
    connection.close();

    println!("\nReplication Status:");
    println!("{:<24} {}", "Server", format!("{}:{}/{}", config.source.host, config.source.port, config.source.database));
    println!("{:<24} {}", "TLS", config.effective_ssl_mode());
    println!("{:-<60}", "");

    let Some(status) = status else {
        println!(
            "{}",
            format!("Slot '{}' does not exist.", config.source.slot).red()
        );
        if !config.source.create_slot {
            println!(
                "{}",
                "Set create_slot = true under [source] to create it on first run.".yellow()
            );
        }
        println!();
        return Ok(());
    };

    let plugin = status.plugin.as_deref().unwrap_or("-");
    let plugin_display = if plugin == config.source.plugin {
        plugin.green()
    } else {
        plugin.yellow()
    };

    println!("{:<24} {}", "Slot", status.slot_name);
    println!("{:<24} {}", "Plugin", plugin_display);
    println!(
        "{:<24} {}",
        "Active",
        if status.active { "yes".green() } else { "no".normal() }
    );
    println!("{:<24} {}", "Restart LSN", display_lsn(status.restart_lsn));
    println!("{:<24} {}", "Confirmed flush LSN", display_lsn(status.confirmed_flush_lsn));
    println!("{:<24} {}", "Checkpoint", display_lsn(checkpoint));

    if let (Some(saved), Some(confirmed)) = (checkpoint, status.confirmed_flush_lsn) {
        if saved > confirmed {
            println!(
                "{}",
                format!(
                    "Checkpoint is {} bytes ahead of the slot; those changes are skipped on resume.",
                    saved.as_u64() - confirmed.as_u64()
                )
                .yellow()
            );
        }
    }

    println!();
    Ok(())
}

fn display_lsn(lsn: Option<Lsn>) -> String {
    lsn.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string())
}
