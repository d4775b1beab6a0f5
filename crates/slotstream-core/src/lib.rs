pub mod assembler;
pub mod error;
pub mod lsn;
pub mod types;

pub use assembler::{Anomaly, Feed, Step, Transaction, TransactionAssembler, BEGIN_MARKER, COMMIT_MARKER};
pub use error::{Error, Result};
pub use lsn::{format_lsn, parse_lsn, Lsn};
pub use types::{validate_attribute_name, DecodedUnit, OutputRecord, LSN_ATTRIBUTE, SLOT_ATTRIBUTE};
