//! Logical replication over a named slot.

pub mod slot;
mod stream;

pub use slot::{ensure_slot, get_confirmed_flush_lsn, slot_status, SlotStatus};
pub use stream::{ChangeRow, ReplicationStream, ReplicationStreamConfig};
