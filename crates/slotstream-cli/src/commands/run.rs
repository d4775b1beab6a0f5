use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use slotstream_config::ReplicationConfig;
use slotstream_core::OutputRecord;
use slotstream_pg::{ChangeSource, Session, StopReport, Trigger};
use slotstream_state::CheckpointStore;
use tracing::{error, info, warn};

pub async fn cmd_run(config: ReplicationConfig, yield_ms: u64) -> Result<()> {
    info!(
        slot = %config.source.slot,
        host = %config.source.host,
        database = %config.source.database,
        "Starting slotstream"
    );

    let mut session = Session::from_config(&config).context("Failed to start session")?;
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    };

    let report = drive(
        &mut session,
        &mut std::io::stdout(),
        Duration::from_millis(yield_ms),
        shutdown,
    )
    .await?;

    if let Some(e) = &report.checkpoint_error {
        warn!(error = %e, "Next run starts from the slot position");
    }

    let stats = session.stats();
    info!(
        transactions = stats.transactions,
        lines = stats.lines,
        rollbacks = stats.rollbacks,
        anomalies = stats.anomalies,
        position = ?report.position.map(|l| l.to_string()),
        "Stopped"
    );

    Ok(())
}

/// Trigger the session until `shutdown` completes, writing each record to `out`.
///
/// A record that cannot be written aborts the session: nothing is
/// checkpointed or acknowledged, so the transaction is read again next run.
async fn drive<S, C, W, F>(
    session: &mut Session<S, C>,
    out: &mut W,
    yield_interval: Duration,
    shutdown: F,
) -> Result<StopReport>
where
    S: ChangeSource,
    C: CheckpointStore,
    W: Write,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown => break,
            outcome = session.trigger() => outcome,
        };

        match outcome {
            Trigger::Emitted(record) => {
                if let Err(e) = emit(out, &record) {
                    error!(error = %e, lsn = %record.lsn, "Failed to write record, aborting");
                    session.abort().await;
                    return Err(e.context(format!("Failed to write transaction {}", record.lsn)));
                }
            }
            Trigger::Accumulated => {}
            Trigger::NoData | Trigger::RolledBack(_) => {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(yield_interval) => {}
                }
            }
        }
    }

    Ok(session.stop().await)
}

/// Write one record as a JSON line.
fn emit<W: Write>(out: &mut W, record: &OutputRecord) -> Result<()> {
    let line = record.to_json_line()?;
    writeln!(out, "{}", line)?;
    out.flush()?;
    Ok(())
}
