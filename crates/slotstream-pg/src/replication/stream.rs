//! Non-blocking change stream over the SQL logical decoding interface.
//!
//! Each fetch peeks whole transactions from the slot without consuming them.
//! Rows are handed out one at a time; once every row of a transaction has
//! been handed out the slot is advanced past its commit on the next fetch.

use std::collections::VecDeque;

use slotstream_core::Lsn;
use tokio_postgres::Client;
use tracing::{debug, info, warn};

use crate::error::{PgError, PgResult};
use crate::replication::slot;

const PEEK_CHANGES: &str =
    "SELECT lsn::text, xid::text, data FROM pg_logical_slot_peek_binary_changes($1, NULL, $2)";

const CONSUME_CHANGES: &str =
    "SELECT count(*) FROM pg_logical_slot_get_binary_changes($1, $2::text::pg_lsn, NULL)";

/// Configuration for the replication stream.
#[derive(Debug, Clone)]
pub struct ReplicationStreamConfig {
    /// Replication slot name.
    pub slot_name: String,
    /// Output plugin used when the slot is created.
    pub plugin: String,
    /// Whether to create the slot if it doesn't exist.
    pub create_slot: bool,
    /// Upper bound on rows per fetch. Postgres only checks it at commits.
    pub fetch_limit: u32,
}

impl Default for ReplicationStreamConfig {
    fn default() -> Self {
        Self {
            slot_name: "slot".to_string(),
            plugin: "test_decoding".to_string(),
            create_slot: false,
            fetch_limit: 128,
        }
    }
}

/// One decoded row as returned by the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRow {
    pub lsn: Lsn,
    pub xid: Option<u32>,
    pub data: Vec<u8>,
}

impl ChangeRow {
    pub fn new(lsn: Lsn, xid: Option<u32>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            lsn,
            xid,
            data: data.into(),
        }
    }
}

/// A row waiting to be handed out, tagged with its transaction's commit position.
#[derive(Debug, Clone, PartialEq, Eq)]
struct QueuedRow {
    row: ChangeRow,
    commit_lsn: Lsn,
    last_in_group: bool,
}

/// Rows of one fetch after dropping transactions that were already delivered.
#[derive(Debug, Default, PartialEq, Eq)]
struct FetchPlan {
    queue: Vec<QueuedRow>,
    /// Highest commit among the dropped transactions.
    skipped_through: Option<Lsn>,
    skipped_rows: usize,
}

/// Split fetched rows into transactions and drop those committed at or before `skip_through`.
///
/// Rows of one transaction arrive contiguously and share an xid; the commit
/// row is the last and highest of its group.
fn plan_fetch(rows: Vec<ChangeRow>, skip_through: Option<Lsn>) -> FetchPlan {
    let mut groups: Vec<Vec<ChangeRow>> = Vec::new();
    for row in rows {
        match groups.last_mut() {
            Some(group) if row.xid.is_some() && group[0].xid == row.xid => group.push(row),
            _ => groups.push(vec![row]),
        }
    }

    let mut plan = FetchPlan::default();
    for group in groups {
        let commit_lsn = group.iter().map(|r| r.lsn).max().unwrap_or_default();

        if skip_through.is_some_and(|s| commit_lsn <= s) {
            plan.skipped_rows += group.len();
            plan.skipped_through = plan.skipped_through.max(Some(commit_lsn));
            continue;
        }

        let len = group.len();
        plan.queue.extend(group.into_iter().enumerate().map(|(i, row)| QueuedRow {
            row,
            commit_lsn,
            last_in_group: i + 1 == len,
        }));
    }

    plan
}

/// Client-side cursor over a logical replication slot.
///
/// Holds no connection of its own: every call takes the current client so the
/// cursor survives reconnects.
pub struct ReplicationStream {
    config: ReplicationStreamConfig,
    start: Option<Lsn>,
    pending: VecDeque<QueuedRow>,
    /// Transactions committed at or before this position have been delivered.
    skip_through: Option<Lsn>,
    /// Position the slot has been advanced to by this stream.
    confirmed: Option<Lsn>,
    /// Highest position handed out so far, else the start position.
    position: Option<Lsn>,
}

impl ReplicationStream {
    /// Open the stream on `config.slot_name`, starting after `start` when given.
    pub async fn open(
        client: &Client,
        config: ReplicationStreamConfig,
        start: Option<Lsn>,
    ) -> PgResult<Self> {
        info!(slot = %config.slot_name, "Opening replication stream");

        slot::ensure_slot(client, &config.slot_name, &config.plugin, config.create_slot).await?;

        let slot_lsn = slot::get_confirmed_flush_lsn(client, &config.slot_name).await?;
        match start {
            Some(lsn) => info!(
                slot = %config.slot_name,
                start_lsn = %lsn,
                slot_lsn = ?slot_lsn.map(|l| l.to_string()),
                "Resuming from checkpoint"
            ),
            None => info!(
                slot = %config.slot_name,
                slot_lsn = ?slot_lsn.map(|l| l.to_string()),
                "Starting from slot position"
            ),
        }

        Ok(Self::new(config, start))
    }

    pub(crate) fn new(config: ReplicationStreamConfig, start: Option<Lsn>) -> Self {
        Self {
            config,
            start,
            pending: VecDeque::new(),
            skip_through: start,
            confirmed: None,
            position: start,
        }
    }

    pub fn start(&self) -> Option<Lsn> {
        self.start
    }

    /// Most recently handed-out position, or the start position before any row.
    pub fn position(&self) -> Option<Lsn> {
        self.position
    }

    /// Return the next row, fetching from the slot only when the local buffer is empty.
    ///
    /// `Ok(None)` means nothing new is available right now.
    pub async fn poll(&mut self, client: &Client) -> PgResult<Option<ChangeRow>> {
        if self.pending.is_empty() {
            self.fetch(client).await?;
        }

        Ok(self.next_buffered())
    }

    /// Hand out the next buffered row, moving the position and, at the end
    /// of a transaction, the watermark.
    fn next_buffered(&mut self) -> Option<ChangeRow> {
        let queued = self.pending.pop_front()?;
        self.position = self.position.max(Some(queued.row.lsn));
        if queued.last_in_group {
            self.skip_through = self.skip_through.max(Some(queued.commit_lsn));
        }
        Some(queued.row)
    }

    /// Buffer fetched rows, dropping transactions at or below the watermark.
    /// Returns the number of rows queued.
    fn buffer(&mut self, rows: Vec<ChangeRow>) -> usize {
        let fetched = rows.len();
        let plan = plan_fetch(rows, self.skip_through);

        if plan.skipped_rows > 0 {
            debug!(
                slot = %self.config.slot_name,
                skipped = plan.skipped_rows,
                "Skipped already delivered changes"
            );
            self.skip_through = self.skip_through.max(plan.skipped_through);
        }

        let queued = plan.queue.len();
        if queued > 0 {
            debug!(slot = %self.config.slot_name, fetched, queued, "Fetched changes");
        }

        self.pending.extend(plan.queue);
        queued
    }

    /// Position the slot should be advanced to, if it lags the watermark.
    fn advance_target(&self) -> Option<Lsn> {
        let through = self.skip_through?;
        match self.confirmed {
            Some(confirmed) if confirmed >= through => None,
            _ => Some(through),
        }
    }

    /// Drop rows that were fetched but never handed out.
    fn drop_buffered(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                slot = %self.config.slot_name,
                buffered = self.pending.len(),
                "Closing stream with undelivered rows"
            );
            self.pending.clear();
        }
    }

    async fn fetch(&mut self, client: &Client) -> PgResult<()> {
        self.consume_delivered(client).await?;

        let limit = i32::try_from(self.config.fetch_limit).unwrap_or(i32::MAX);
        let rows = client
            .query(PEEK_CHANGES, &[&self.config.slot_name, &limit])
            .await
            .map_err(|e| PgError::Stream(format!("peek changes: {}", e)))?;

        let mut changes = Vec::with_capacity(rows.len());
        for row in rows {
            let lsn_str: String = row.get(0);
            let xid: Option<String> = row.get(1);
            let data: Vec<u8> = row.get(2);

            let lsn = lsn_str.parse::<Lsn>()?;
            let xid = xid.and_then(|x| x.parse::<u32>().ok());
            changes.push(ChangeRow::new(lsn, xid, data));
        }

        self.buffer(changes);
        Ok(())
    }

    /// Advance the slot past every transaction that has been fully handed out.
    async fn consume_delivered(&mut self, client: &Client) -> PgResult<()> {
        let Some(through) = self.advance_target() else {
            return Ok(());
        };

        client
            .query_one(CONSUME_CHANGES, &[&self.config.slot_name, &through.to_string()])
            .await
            .map_err(|e| PgError::Stream(format!("advance slot to {}: {}", through, e)))?;

        debug!(slot = %self.config.slot_name, lsn = %through, "Advanced slot");
        self.confirmed = Some(through);
        Ok(())
    }

    /// Advance the slot a final time before the stream is discarded.
    ///
    /// Buffered rows that were never handed out stay in the slot.
    pub async fn close(&mut self, client: &Client) -> PgResult<()> {
        self.drop_buffered();
        self.consume_delivered(client).await?;
        info!(slot = %self.config.slot_name, position = ?self.position.map(|l| l.to_string()), "Closed replication stream");
        Ok(())
    }
}
