mod error;
mod file;
mod memory;

use slotstream_core::Lsn;

pub use error::{StateError, StateResult};
pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

/// Trait for resume-position storage backends.
///
/// A store holds at most one position: the last one observed before the
/// session stopped.
pub trait CheckpointStore: Send + Sync {
    /// Read the stored position.
    ///
    /// `Ok(None)` means nothing was stored yet (or storage is disabled).
    fn load(&self) -> StateResult<Option<Lsn>>;

    /// Overwrite the stored position.
    fn save(&self, lsn: Lsn) -> StateResult<()>;

    /// Human readable location, used in log lines.
    fn describe(&self) -> String;
}
