use slotstream_core::validate_attribute_name;

use crate::error::{ConfigError, ConfigResult};
use crate::replication::ReplicationConfig;

/// Validate a parsed configuration.
pub fn validate(config: &ReplicationConfig) -> ConfigResult<()> {
    let source = &config.source;

    for (field, value) in [
        ("source.database", &source.database),
        ("source.host", &source.host),
        ("source.slot", &source.slot),
        ("source.username", &source.username),
        ("source.plugin", &source.plugin),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(field, "must not be empty"));
        }
    }

    if source.port == 0 {
        return Err(ConfigError::invalid("source.port", "must be between 1 and 65535"));
    }

    if source.fetch_limit == 0 || source.fetch_limit > i32::MAX as u32 {
        return Err(ConfigError::invalid(
            "source.fetch_limit",
            "must be a positive 32-bit integer",
        ));
    }

    if !is_valid_slot_name(&source.slot) {
        return Err(ConfigError::invalid(
            "source.slot",
            "may only contain lower case letters, numbers and underscores",
        ));
    }

    if let Some(path) = &config.checkpoint.path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("checkpoint.path", "must not be empty"));
        }
    }

    validate_attribute_name(&config.output.attribute)
        .map_err(|e| ConfigError::invalid("output.attribute", e.to_string()))?;

    Ok(())
}

/// PostgreSQL restricts slot names to `[a-z0-9_]{1,63}`.
fn is_valid_slot_name(name: &str) -> bool {
    name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> ConfigResult<ReplicationConfig> {
        ReplicationConfig::parse(toml)
    }

    fn field_of(result: ConfigResult<ReplicationConfig>) -> String {
        match result {
            Err(ConfigError::InvalidValue { field, .. }) => field,
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&ReplicationConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        assert_eq!(field_of(parse("[source]\ndatabase = \"\"")), "source.database");
        assert_eq!(field_of(parse("[source]\nhost = \"  \"")), "source.host");
        assert_eq!(field_of(parse("[source]\nusername = \"\"")), "source.username");
    }

    #[test]
    fn test_port_zero_rejected() {
        assert_eq!(field_of(parse("[source]\nport = 0")), "source.port");
        // Out of u16 range fails at the TOML layer.
        assert!(matches!(
            parse("[source]\nport = 70000"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_fetch_limit_zero_rejected() {
        assert_eq!(field_of(parse("[source]\nfetch_limit = 0")), "source.fetch_limit");
    }

    #[test]
    fn test_slot_name_rules() {
        assert!(is_valid_slot_name("orders_slot_1"));
        assert!(!is_valid_slot_name("Orders"));
        assert!(!is_valid_slot_name("slot-name"));
        assert!(!is_valid_slot_name(&"a".repeat(64)));
        assert_eq!(field_of(parse("[source]\nslot = \"bad slot\"")), "source.slot");
    }

    #[test]
    fn test_output_attribute_rules() {
        assert_eq!(field_of(parse("[output]\nattribute = \"\"")), "output.attribute");
        assert_eq!(
            field_of(parse("[output]\nattribute = \"two words\"")),
            "output.attribute"
        );
        assert_eq!(
            field_of(parse("[output]\nattribute = \"slotstream.lsn\"")),
            "output.attribute"
        );
        assert_eq!(
            field_of(parse("[output]\nattribute = \"slotstream.slot\"")),
            "output.attribute"
        );
        assert!(parse("[output]\nattribute = \"tx.text\"").is_ok());
    }

    #[test]
    fn test_empty_checkpoint_path_rejected() {
        assert_eq!(field_of(parse("[checkpoint]\npath = \"\"")), "checkpoint.path");
    }
}
