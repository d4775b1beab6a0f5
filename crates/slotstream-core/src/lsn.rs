//! LSN (Log Sequence Number) position type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A position in the write-ahead log.
///
/// Ordered, so a stream can compare positions to skip rows it already
/// handed out. The textual form is PostgreSQL's `X/Y` notation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Lsn(value)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_lsn(self.0))
    }
}

impl FromStr for Lsn {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_lsn(s).map(Lsn)
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse LSN from "X/Y" format to u64.
pub fn parse_lsn(lsn: &str) -> Result<u64> {
    let lsn = lsn.trim();
    let (high, low) = lsn
        .split_once('/')
        .ok_or_else(|| Error::InvalidLsn(lsn.to_string()))?;

    let high = u32::from_str_radix(high, 16).map_err(|_| Error::InvalidLsn(lsn.to_string()))?;
    let low = u32::from_str_radix(low, 16).map_err(|_| Error::InvalidLsn(lsn.to_string()))?;

    Ok((u64::from(high) << 32) | u64::from(low))
}

/// Format u64 LSN to "X/Y" format.
pub fn format_lsn(lsn: u64) -> String {
    let high = lsn >> 32;
    let low = lsn & 0xFFFFFFFF;
    format!("{:X}/{:X}", high, low)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lsn() {
        assert_eq!(parse_lsn("0/16B3748").unwrap(), 0x16B3748);
        assert_eq!(parse_lsn("1/16B3748").unwrap(), 0x100000000 + 0x16B3748);
        assert_eq!(parse_lsn(" 0/10\n").unwrap(), 0x10);
        assert!(parse_lsn("invalid").is_err());
        assert!(parse_lsn("0/").is_err());
        assert!(parse_lsn("1/2/3").is_err());
        assert!(parse_lsn("100000000/0").is_err());
    }

    #[test]
    fn test_format_lsn() {
        assert_eq!(format_lsn(0x16B3748), "0/16B3748");
        assert_eq!(format_lsn(0x100000000 + 0x16B3748), "1/16B3748");
    }

    #[test]
    fn test_lsn_display_and_from_str() {
        let lsn: Lsn = "16/B374D848".parse().unwrap();
        assert_eq!(lsn.to_string(), "16/B374D848");
        assert!(Lsn(1) < Lsn(2));
        assert_eq!(Lsn::default(), Lsn::ZERO);
    }

    #[test]
    fn test_lsn_serde_as_text() {
        let json = serde_json::to_string(&Lsn(0x16B3748)).unwrap();
        assert_eq!(json, "\"0/16B3748\"");

        let back: Lsn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Lsn(0x16B3748));

        assert!(serde_json::from_str::<Lsn>("\"garbage\"").is_err());
    }
}
