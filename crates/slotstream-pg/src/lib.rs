mod connect;
mod error;
pub mod mock;
pub mod replication;
mod session;
mod source;
mod tls;

pub use connect::{ConnectParams, ConnectionManager};
pub use error::{PgError, PgResult};
pub use mock::{MockPoll, MockSource};
pub use replication::{ChangeRow, ReplicationStream, ReplicationStreamConfig, SlotStatus};
pub use session::{Session, SessionStats, StopReport, Trigger};
pub use source::{ChangeSource, PgSource};
