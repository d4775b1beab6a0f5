use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembler::Transaction;
use crate::error::{Error, Result};
use crate::lsn::Lsn;

/// Attribute carrying the slot a record was read from.
pub const SLOT_ATTRIBUTE: &str = "slotstream.slot";

/// Attribute carrying the commit position of the record's transaction.
pub const LSN_ATTRIBUTE: &str = "slotstream.lsn";

/// One line of logical decoding output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedUnit {
    /// Position of the change record that produced this line.
    pub lsn: Lsn,
    /// Transaction id, when the source reports one.
    pub xid: Option<u32>,
    /// The decoded text.
    pub line: String,
}

impl DecodedUnit {
    pub fn new(lsn: Lsn, line: impl Into<String>) -> Self {
        Self {
            lsn,
            xid: None,
            line: line.into(),
        }
    }

    /// Decode a raw wire chunk. Invalid UTF-8 is replaced rather than rejected.
    pub fn decode(lsn: Lsn, xid: Option<u32>, data: &[u8]) -> Self {
        Self {
            lsn,
            xid,
            line: String::from_utf8_lossy(data).into_owned(),
        }
    }

    pub fn starts_with(&self, marker: &str) -> bool {
        self.line.starts_with(marker)
    }
}

/// The downstream record produced for each completed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id: Uuid,
    pub emitted_at: DateTime<Utc>,
    pub lsn: Lsn,
    pub attributes: BTreeMap<String, String>,
}

impl OutputRecord {
    /// Build a record carrying the transaction text under `attribute`, plus
    /// the slot and commit position it was read from.
    ///
    /// The attribute name is expected to have passed [`validate_attribute_name`].
    pub fn from_transaction(attribute: &str, slot: &str, transaction: &Transaction) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(SLOT_ATTRIBUTE.to_string(), slot.to_string());
        attributes.insert(LSN_ATTRIBUTE.to_string(), transaction.commit_lsn.to_string());
        attributes.insert(attribute.to_string(), transaction.text.clone());

        Self {
            id: Uuid::new_v4(),
            emitted_at: Utc::now(),
            lsn: transaction.commit_lsn,
            attributes,
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Check that a name is usable as the transaction attribute key.
///
/// Names reserved for provenance attributes are rejected.
pub fn validate_attribute_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.chars().any(|c| c.is_whitespace() || c.is_control())
        || name == SLOT_ATTRIBUTE
        || name == LSN_ATTRIBUTE
    {
        return Err(Error::InvalidAttributeName(name.to_string()));
    }
    Ok(())
}
