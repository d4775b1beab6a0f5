use thiserror::Error;

/// Errors that can occur in slotstream-core.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid LSN format: {0}")]
    InvalidLsn(String),

    #[error("invalid attribute name '{0}'")]
    InvalidAttributeName(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
