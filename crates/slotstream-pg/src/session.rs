//! The session controller: one trigger reads one line, one stop persists the position.

use slotstream_config::ReplicationConfig;
use slotstream_core::{
    validate_attribute_name, DecodedUnit, Feed, Lsn, OutputRecord, TransactionAssembler,
};
use slotstream_state::{CheckpointStore, FileCheckpointStore, StateError};
use tracing::{debug, error, info, warn};

use crate::error::PgError;
use crate::source::{ChangeSource, PgSource};

/// Outcome of a single trigger.
#[derive(Debug)]
pub enum Trigger {
    /// A transaction completed and produced a record.
    Emitted(OutputRecord),
    /// A line was buffered into an open transaction.
    Accumulated,
    /// Nothing new was available.
    NoData,
    /// The trigger failed and left no trace; the next one retries.
    RolledBack(PgError),
}

impl Trigger {
    pub fn record(&self) -> Option<&OutputRecord> {
        match self {
            Trigger::Emitted(record) => Some(record),
            _ => None,
        }
    }

    /// True when the caller should back off before the next trigger.
    pub fn is_idle(&self) -> bool {
        matches!(self, Trigger::NoData | Trigger::RolledBack(_))
    }
}

/// What happened during [`Session::stop`].
#[derive(Debug, Default)]
pub struct StopReport {
    /// Position read from the stream, if one was known.
    pub position: Option<Lsn>,
    /// Whether the position reached the checkpoint store.
    pub saved: bool,
    pub checkpoint_error: Option<StateError>,
    pub teardown_errors: Vec<PgError>,
    /// Lines of an unfinished transaction that were dropped.
    pub discarded_lines: usize,
}

/// Counters over the session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines: u64,
    pub transactions: u64,
    pub rollbacks: u64,
    pub anomalies: u64,
}

/// Drives a change source through the transaction assembler.
pub struct Session<S, C> {
    source: S,
    store: C,
    attribute: String,
    assembler: TransactionAssembler,
    /// Loaded checkpoint, used for the first stream open only.
    resume_hint: Option<Lsn>,
    stats: SessionStats,
}

impl Session<PgSource, FileCheckpointStore> {
    /// Session over the configured Postgres slot and checkpoint file.
    pub fn from_config(config: &ReplicationConfig) -> slotstream_core::Result<Self> {
        Self::start(
            PgSource::from_config(config),
            FileCheckpointStore::new(config.checkpoint.path.clone()),
            config.output.attribute.clone(),
        )
    }
}

impl<S: ChangeSource, C: CheckpointStore> Session<S, C> {
    /// Create a session, loading the checkpoint once.
    ///
    /// No connection is made until the first trigger. A checkpoint that cannot
    /// be read is logged and ignored.
    pub fn start(source: S, store: C, attribute: impl Into<String>) -> slotstream_core::Result<Self> {
        let attribute = attribute.into();
        validate_attribute_name(&attribute)?;

        let resume_hint = match store.load() {
            Ok(Some(lsn)) => {
                info!(checkpoint = %store.describe(), lsn = %lsn, "Loaded checkpoint");
                Some(lsn)
            }
            Ok(None) => {
                info!(checkpoint = %store.describe(), "No checkpoint, starting from slot position");
                None
            }
            Err(e) => {
                warn!(checkpoint = %store.describe(), error = %e, "Ignoring unreadable checkpoint");
                None
            }
        };

        info!(slot = %source.slot(), attribute = %attribute, "Session started");

        Ok(Self {
            source,
            store,
            attribute,
            assembler: TransactionAssembler::new(),
            resume_hint,
            stats: SessionStats::default(),
        })
    }

    /// Run one step: make sure the stream is open, read at most one line,
    /// and emit a record if that line completed a transaction.
    ///
    /// Failures are logged and returned as [`Trigger::RolledBack`]; the
    /// partially assembled transaction is kept for the next trigger.
    pub async fn trigger(&mut self) -> Trigger {
        match self.step().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.rollbacks += 1;
                let kind = if e.is_connection() {
                    "connection"
                } else if e.is_stream() {
                    "stream"
                } else {
                    "other"
                };
                error!(
                    slot = %self.source.slot(),
                    kind,
                    error = %e,
                    buffered_lines = self.assembler.pending_lines(),
                    "Trigger failed, rolled back"
                );
                Trigger::RolledBack(e)
            }
        }
    }

    async fn step(&mut self) -> Result<Trigger, PgError> {
        self.source.connect().await?;

        if !self.source.is_stream_open() {
            self.source.open_stream(self.resume_hint).await?;
            self.resume_hint = None;
        }

        let Some(row) = self.source.poll().await? else {
            return Ok(Trigger::NoData);
        };

        let unit = DecodedUnit::decode(row.lsn, row.xid, &row.data);
        self.stats.lines += 1;
        debug!(lsn = %unit.lsn, line = %unit.line, "Received line");

        let step = self.assembler.feed(&unit);
        if let Some(anomaly) = step.anomaly {
            self.stats.anomalies += 1;
            warn!(slot = %self.source.slot(), lsn = %unit.lsn, %anomaly, "Unexpected transaction boundary");
        }

        match step.feed {
            Feed::Pending => Ok(Trigger::Accumulated),
            Feed::Complete(transaction) => {
                self.stats.transactions += 1;
                let record =
                    OutputRecord::from_transaction(&self.attribute, self.source.slot(), &transaction);

                info!(
                    slot = %self.source.slot(),
                    lsn = %transaction.commit_lsn,
                    lines = transaction.lines,
                    "Emitting transaction"
                );
                Ok(Trigger::Emitted(record))
            }
        }
    }

    /// Persist the current position, then close the stream and the connection.
    ///
    /// Never fails: problems are logged and collected in the report. The
    /// session may be triggered again afterwards and will reconnect.
    pub async fn stop(&mut self) -> StopReport {
        let mut report = StopReport {
            position: self.source.position(),
            ..Default::default()
        };

        match report.position {
            Some(lsn) => match self.store.save(lsn) {
                Ok(()) => {
                    report.saved = true;
                    info!(checkpoint = %self.store.describe(), lsn = %lsn, "Saved checkpoint");
                }
                Err(e) => {
                    warn!(checkpoint = %self.store.describe(), error = %e, "Checkpoint lost");
                    report.checkpoint_error = Some(e);
                }
            },
            None => debug!("No position observed, checkpoint left unchanged"),
        }

        report.teardown_errors = self.source.close().await;
        self.finish(&mut report);
        report
    }

    /// Tear down without persisting anything, for when an emitted record
    /// could not be delivered.
    ///
    /// The checkpoint is left as it was and the slot is not advanced, so the
    /// next session reads the undelivered transaction again.
    pub async fn abort(&mut self) -> StopReport {
        let mut report = StopReport {
            position: self.source.position(),
            ..Default::default()
        };

        warn!(
            slot = %self.source.slot(),
            position = ?report.position.map(|l| l.to_string()),
            "Aborting session, checkpoint left unchanged"
        );

        report.teardown_errors = self.source.discard().await;
        self.finish(&mut report);
        report
    }

    fn finish(&mut self, report: &mut StopReport) {
        for e in &report.teardown_errors {
            error!(slot = %self.source.slot(), error = %e, "Error closing replication source");
        }

        if !self.assembler.is_idle() {
            report.discarded_lines = self.assembler.pending_lines();
            warn!(
                slot = %self.source.slot(),
                lines = report.discarded_lines,
                "Discarding unfinished transaction, it will be read again"
            );
            self.assembler = TransactionAssembler::new();
        }

        info!(
            slot = %self.source.slot(),
            lines = self.stats.lines,
            transactions = self.stats.transactions,
            rollbacks = self.stats.rollbacks,
            "Session stopped"
        );
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// Text of the transaction being assembled.
    pub fn buffered(&self) -> &str {
        self.assembler.buffered()
    }

    /// Checkpoint that the next stream open will start from.
    pub fn resume_hint(&self) -> Option<Lsn> {
        self.resume_hint
    }
}
