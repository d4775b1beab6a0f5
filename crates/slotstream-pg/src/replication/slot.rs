//! Replication slot management.
//!
//! Verifies and creates the logical replication slot the stream reads from.

use slotstream_core::Lsn;
use tokio_postgres::Client;
use tracing::{info, warn};

use crate::error::{PgError, PgResult};

/// Snapshot of a slot as reported by `pg_replication_slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotStatus {
    pub slot_name: String,
    pub plugin: Option<String>,
    pub active: bool,
    pub restart_lsn: Option<Lsn>,
    pub confirmed_flush_lsn: Option<Lsn>,
}

/// Check if a replication slot exists.
pub async fn slot_exists(client: &Client, slot_name: &str) -> PgResult<bool> {
    let exists: bool = client
        .query_one(
            "SELECT EXISTS(SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)",
            &[&slot_name],
        )
        .await?
        .get(0);

    Ok(exists)
}

/// Get the output plugin a replication slot decodes with.
pub async fn get_slot_plugin(client: &Client, slot_name: &str) -> PgResult<Option<String>> {
    let row = client
        .query_opt(
            "SELECT plugin::text FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    Ok(row.and_then(|r| r.get(0)))
}

/// Create a logical replication slot with the given output plugin.
pub async fn create_slot(client: &Client, slot_name: &str, plugin: &str) -> PgResult<()> {
    info!(slot = %slot_name, plugin = %plugin, "Creating replication slot");
    client
        .execute(
            "SELECT pg_create_logical_replication_slot($1, $2)",
            &[&slot_name, &plugin],
        )
        .await
        .map_err(|e| PgError::SlotCreationFailed(e.to_string()))?;

    Ok(())
}

/// Drop a replication slot.
pub async fn drop_slot(client: &Client, slot_name: &str) -> PgResult<()> {
    info!(slot = %slot_name, "Dropping replication slot");
    client
        .execute("SELECT pg_drop_replication_slot($1)", &[&slot_name])
        .await?;

    Ok(())
}

/// Ensure a replication slot exists.
///
/// A missing slot is created when `create_if_missing` is set and is an error
/// otherwise. A slot that decodes with a different plugin is left alone: the
/// stream passes its lines through unchanged, so only a warning is logged.
pub async fn ensure_slot(
    client: &Client,
    slot_name: &str,
    plugin: &str,
    create_if_missing: bool,
) -> PgResult<()> {
    if slot_exists(client, slot_name).await? {
        let existing = get_slot_plugin(client, slot_name).await?;

        if existing.as_deref() != Some(plugin) {
            warn!(
                slot = %slot_name,
                expected = %plugin,
                plugin = ?existing,
                "Existing slot uses a different plugin"
            );
        } else {
            info!(slot = %slot_name, "Using existing replication slot");
        }
    } else if create_if_missing {
        create_slot(client, slot_name, plugin).await?;
    } else {
        return Err(PgError::SlotNotFound(slot_name.to_string()));
    }

    Ok(())
}

/// Get the confirmed_flush_lsn for a slot.
pub async fn get_confirmed_flush_lsn(client: &Client, slot_name: &str) -> PgResult<Option<Lsn>> {
    let row = client
        .query_opt(
            "SELECT confirmed_flush_lsn::text FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    let text: Option<String> = row.and_then(|r| r.get(0));
    text.map(|t| t.parse::<Lsn>().map_err(PgError::from)).transpose()
}

/// Read the slot's row from `pg_replication_slots`, if it exists.
pub async fn slot_status(client: &Client, slot_name: &str) -> PgResult<Option<SlotStatus>> {
    let row = client
        .query_opt(
            "SELECT slot_name::text, plugin::text, active, restart_lsn::text, confirmed_flush_lsn::text \
             FROM pg_replication_slots WHERE slot_name = $1",
            &[&slot_name],
        )
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let parse = |text: Option<String>| -> PgResult<Option<Lsn>> {
        text.map(|t| t.parse::<Lsn>().map_err(PgError::from)).transpose()
    };

    Ok(Some(SlotStatus {
        slot_name: row.get(0),
        plugin: row.get(1),
        active: row.get(2),
        restart_lsn: parse(row.get(3))?,
        confirmed_flush_lsn: parse(row.get(4))?,
    }))
}
