use std::sync::Mutex;

use slotstream_core::Lsn;

use crate::error::StateResult;
use crate::CheckpointStore;

/// In-process checkpoint store (for testing).
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    lsn: Mutex<Option<Lsn>>,
    saves: Mutex<usize>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `lsn`.
    pub fn with_lsn(lsn: Lsn) -> Self {
        Self {
            lsn: Mutex::new(Some(lsn)),
            saves: Mutex::new(0),
        }
    }

    /// Number of times `save` was called.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> StateResult<Option<Lsn>> {
        Ok(*self.lsn.lock().unwrap())
    }

    fn save(&self, lsn: Lsn) -> StateResult<()> {
        *self.lsn.lock().unwrap() = Some(lsn);
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}
