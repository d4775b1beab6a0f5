mod env;
mod error;
mod replication;
mod validation;

pub use env::resolve_env;
pub use error::{ConfigError, ConfigResult};
pub use replication::{
    CheckpointConfig, OutputConfig, ReplicationConfig, SourceConfig, SslMode, TlsConfig,
    DEFAULT_OUTPUT_ATTRIBUTE,
};
pub use validation::validate;
