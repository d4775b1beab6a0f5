use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("not connected")]
    NotConnected,

    #[error("replication stream error: {0}")]
    Stream(String),

    #[error("replication slot '{0}' does not exist")]
    SlotNotFound(String),

    #[error("failed to create replication slot: {0}")]
    SlotCreationFailed(String),

    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),
}

impl PgError {
    /// True for failures to establish the connection; the next trigger retries.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            PgError::Connection(_) | PgError::Tls(_) | PgError::NotConnected
        )
    }

    /// True for failures opening or reading the replication stream.
    pub fn is_stream(&self) -> bool {
        matches!(
            self,
            PgError::Stream(_)
                | PgError::SlotNotFound(_)
                | PgError::SlotCreationFailed(_)
                | PgError::InvalidLsn(_)
        )
    }
}

impl From<tokio_postgres::Error> for PgError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Extract database error details if available
        if let Some(db_err) = e.as_db_error() {
            let msg = format!(
                "{}: {} (code: {})",
                db_err.severity(),
                db_err.message(),
                db_err.code().code()
            );
            PgError::Postgres(msg)
        } else if e.is_closed() {
            PgError::Connection(e.to_string())
        } else {
            PgError::Postgres(e.to_string())
        }
    }
}

impl From<slotstream_core::Error> for PgError {
    fn from(e: slotstream_core::Error) -> Self {
        match e {
            slotstream_core::Error::InvalidLsn(lsn) => PgError::InvalidLsn(lsn),
            other => PgError::Stream(other.to_string()),
        }
    }
}

pub type PgResult<T> = Result<T, PgError>;
