//! The change source seam the session drives.

use std::future::Future;

use slotstream_config::ReplicationConfig;
use slotstream_core::Lsn;
use tracing::{debug, warn};

use crate::connect::{ConnectParams, ConnectionManager};
use crate::error::{PgError, PgResult};
use crate::replication::{ChangeRow, ReplicationStream, ReplicationStreamConfig};

/// A connection plus at most one open stream over a replication slot.
pub trait ChangeSource: Send {
    /// Establish the connection if there is none. Calling it again is a no-op.
    fn connect(&mut self) -> impl Future<Output = PgResult<()>> + Send;

    /// Whether a stream has been opened and not closed since.
    fn is_stream_open(&self) -> bool;

    /// Open the stream starting after `start`, or at the slot's own position.
    /// Returns without reopening if a stream is already open.
    fn open_stream(&mut self, start: Option<Lsn>) -> impl Future<Output = PgResult<()>> + Send;

    /// Next row if one is available, without waiting for new changes.
    fn poll(&mut self) -> impl Future<Output = PgResult<Option<ChangeRow>>> + Send;

    /// Most recently received position, or the start position.
    fn position(&self) -> Option<Lsn>;

    /// Close the stream, then the connection. Returns the failures encountered.
    fn close(&mut self) -> impl Future<Output = Vec<PgError>> + Send;

    /// Drop the stream and the connection without acknowledging anything,
    /// leaving every row handed out since the last advance in the slot.
    fn discard(&mut self) -> impl Future<Output = Vec<PgError>> + Send;

    /// Name of the slot being read.
    fn slot(&self) -> &str;
}

/// Postgres-backed change source.
pub struct PgSource {
    connection: ConnectionManager,
    stream_config: ReplicationStreamConfig,
    stream: Option<ReplicationStream>,
}

impl PgSource {
    pub fn new(params: ConnectParams, stream_config: ReplicationStreamConfig) -> Self {
        Self {
            connection: ConnectionManager::new(params),
            stream_config,
            stream: None,
        }
    }

    pub fn from_config(config: &ReplicationConfig) -> Self {
        Self::new(
            ConnectParams::from_config(config),
            ReplicationStreamConfig {
                slot_name: config.source.slot.clone(),
                plugin: config.source.plugin.clone(),
                create_slot: config.source.create_slot,
                fetch_limit: config.source.fetch_limit,
            },
        )
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

impl ChangeSource for PgSource {
    fn connect(&mut self) -> impl Future<Output = PgResult<()>> + Send {
        async move {
            self.connection.get_connection().await?;
            Ok(())
        }
    }

    fn is_stream_open(&self) -> bool {
        self.stream.is_some()
    }

    fn open_stream(&mut self, start: Option<Lsn>) -> impl Future<Output = PgResult<()>> + Send {
        async move {
            if self.stream.is_some() {
                return Ok(());
            }

            let client = self.connection.get_connection().await?;
            let stream = ReplicationStream::open(client, self.stream_config.clone(), start).await?;
            self.stream = Some(stream);
            Ok(())
        }
    }

    fn poll(&mut self) -> impl Future<Output = PgResult<Option<ChangeRow>>> + Send {
        async move {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| PgError::Stream("stream is not open".to_string()))?;
            let client = self.connection.get_connection().await?;
            stream.poll(client).await
        }
    }

    fn position(&self) -> Option<Lsn> {
        self.stream.as_ref().and_then(|s| s.position())
    }

    fn close(&mut self) -> impl Future<Output = Vec<PgError>> + Send {
        async move {
            let mut errors = Vec::new();

            if let Some(mut stream) = self.stream.take() {
                if self.connection.is_connected() {
                    match self.connection.get_connection().await {
                        Ok(client) => {
                            if let Err(e) = stream.close(client).await {
                                errors.push(e);
                            }
                        }
                        Err(e) => errors.push(e),
                    }
                } else {
                    warn!(
                        slot = %self.stream_config.slot_name,
                        "Connection lost before close, slot not advanced"
                    );
                }
            }

            if self.connection.close() {
                debug!(slot = %self.stream_config.slot_name, "Connection closed");
            }

            errors
        }
    }

    fn discard(&mut self) -> impl Future<Output = Vec<PgError>> + Send {
        async move {
            if let Some(stream) = self.stream.take() {
                warn!(
                    slot = %self.stream_config.slot_name,
                    position = ?stream.position().map(|l| l.to_string()),
                    "Discarding stream, slot not advanced"
                );
            }

            if self.connection.close() {
                debug!(slot = %self.stream_config.slot_name, "Connection closed");
            }

            Vec::new()
        }
    }

    fn slot(&self) -> &str {
        &self.stream_config.slot_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let config = ReplicationConfig::parse(
            r#"
[source]
slot = "orders_slot"
create_slot = true
fetch_limit = 16
"#,
        )
        .unwrap();

        let source = PgSource::from_config(&config);
        assert_eq!(source.slot(), "orders_slot");
        assert!(source.stream_config.create_slot);
        assert_eq!(source.stream_config.fetch_limit, 16);
        assert_eq!(source.stream_config.plugin, "test_decoding");
        assert!(!source.is_stream_open());
        assert_eq!(source.position(), None);
    }

    #[tokio::test]
    async fn test_poll_before_open_is_stream_error() {
        let config = ReplicationConfig::default();
        let mut source = PgSource::from_config(&config);

        let err = source.poll().await.unwrap_err();
        assert!(matches!(err, PgError::Stream(_)));
    }

    #[tokio::test]
    async fn test_open_stream_is_idempotent() {
        // The host is unreachable, so any attempt to connect would fail.
        let mut source = PgSource::from_config(
            &ReplicationConfig::parse("[source]\nhost = \"127.0.0.1\"\nport = 1").unwrap(),
        );
        source.stream = Some(ReplicationStream::new(
            source.stream_config.clone(),
            Some(Lsn(0x40)),
        ));

        source.open_stream(None).await.unwrap();
        assert!(source.is_stream_open());
        assert!(!source.connection().is_connected());
        assert_eq!(source.position(), Some(Lsn(0x40)));
    }

    #[tokio::test]
    async fn test_first_open_failure_leaves_stream_closed() {
        let mut source = PgSource::from_config(
            &ReplicationConfig::parse("[source]\nhost = \"127.0.0.1\"\nport = 1").unwrap(),
        );

        let err = source.open_stream(Some(Lsn(0x40))).await.unwrap_err();
        assert!(err.is_connection());
        assert!(!source.is_stream_open());
    }

    #[tokio::test]
    async fn test_discard_drops_stream_without_connection() {
        let mut source = PgSource::from_config(&ReplicationConfig::default());
        source.stream = Some(ReplicationStream::new(source.stream_config.clone(), None));

        assert!(source.discard().await.is_empty());
        assert!(!source.is_stream_open());
    }

    #[tokio::test]
    async fn test_close_without_connection_is_clean() {
        let mut source = PgSource::from_config(&ReplicationConfig::default());
        assert!(source.close().await.is_empty());
        assert!(!source.connection().is_connected());
    }
}
