use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::env::resolve_env;
use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate;

/// Attribute name used for the transaction text when none is configured.
pub const DEFAULT_OUTPUT_ATTRIBUTE: &str = "transaction";

/// Session configuration as read from `slotstream.toml`.
///
/// Every table is optional; missing values fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplicationConfig {
    /// Source database and replication slot.
    #[serde(default)]
    pub source: SourceConfig,
    /// Transport encryption.
    #[serde(default)]
    pub tls: TlsConfig,
    /// Where the resume position is persisted.
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    /// Shape of the downstream records.
    #[serde(default)]
    pub output: OutputConfig,
}

impl ReplicationConfig {
    /// Parse, resolve `${VAR}` references and validate.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let mut config: ReplicationConfig = toml::from_str(toml_str)?;
        config.resolve_env()?;
        validate(&config)?;
        Ok(config)
    }

    /// Load a config file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// The TLS mode actually used to connect.
    ///
    /// When TLS is switched off the configured mode is ignored.
    pub fn effective_ssl_mode(&self) -> SslMode {
        if self.tls.enabled {
            self.tls.mode
        } else {
            SslMode::Disable
        }
    }

    fn resolve_env(&mut self) -> ConfigResult<()> {
        let source = &mut self.source;
        for field in [
            &mut source.database,
            &mut source.host,
            &mut source.slot,
            &mut source.username,
            &mut source.password,
        ] {
            *field = resolve_env(field)?;
        }

        self.tls.root_cert = resolve_path(&self.tls.root_cert)?;
        if let Some(path) = &self.checkpoint.path {
            self.checkpoint.path = Some(resolve_path(path)?);
        }

        Ok(())
    }
}

fn resolve_path(path: &Path) -> ConfigResult<PathBuf> {
    match path.to_str() {
        Some(s) => Ok(PathBuf::from(resolve_env(s)?)),
        None => Ok(path.to_path_buf()),
    }
}

/// Source database and replication slot.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub database: String,
    pub host: String,
    pub port: u16,
    /// Replication slot to read from.
    pub slot: String,
    pub username: String,
    pub password: String,
    /// Create the slot on first use if it does not exist.
    pub create_slot: bool,
    /// Output plugin used when creating the slot.
    pub plugin: String,
    /// Maximum number of changes requested from the server per fetch.
    pub fetch_limit: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            database: "niledb".to_string(),
            host: "db".to_string(),
            port: 5432,
            slot: "slot".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            create_slot: false,
            plugin: "test_decoding".to_string(),
            fetch_limit: 128,
        }
    }
}

/// Transport encryption settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    pub enabled: bool,
    pub mode: SslMode,
    /// PEM file holding the root certificate(s) trusted by the verifying modes.
    /// Empty means the bundled public CA roots.
    pub root_cert: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SslMode::VerifyCa,
            root_cert: PathBuf::from("misc/ssl/BaltimoreCyberTrustRoot.crt.pem"),
        }
    }
}

/// Checkpoint file location. No path means no checkpointing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointConfig {
    pub path: Option<PathBuf>,
}

/// Downstream record settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Attribute that carries the transaction text.
    pub attribute: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            attribute: DEFAULT_OUTPUT_ATTRIBUTE.to_string(),
        }
    }
}

/// libpq-style `sslmode`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    Allow,
    Prefer,
    Require,
    #[default]
    #[serde(alias = "verify-certificate-authority")]
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// Whether the server certificate chain is checked against the root certificate.
    pub fn verifies_certificate(self) -> bool {
        matches!(self, SslMode::VerifyCa | SslMode::VerifyFull)
    }

    /// Whether the connection fails when TLS cannot be negotiated.
    pub fn requires_tls(self) -> bool {
        matches!(
            self,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull
        )
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        match s {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify-certificate-authority" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(ConfigError::InvalidSslMode {
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReplicationConfig::parse("").unwrap();

        assert_eq!(config.source.database, "niledb");
        assert_eq!(config.source.host, "db");
        assert_eq!(config.source.port, 5432);
        assert_eq!(config.source.slot, "slot");
        assert_eq!(config.source.plugin, "test_decoding");
        assert!(!config.source.create_slot);
        assert!(!config.tls.enabled);
        assert_eq!(config.tls.mode, SslMode::VerifyCa);
        assert_eq!(config.checkpoint.path, None);
        assert_eq!(config.output.attribute, DEFAULT_OUTPUT_ATTRIBUTE);
        assert_eq!(config.effective_ssl_mode(), SslMode::Disable);
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
[source]
database = "orders"
host = "localhost"
port = 5433
slot = "orders_slot"
username = "replicator"
password = "secret"
create_slot = true
fetch_limit = 10

[tls]
enabled = true
mode = "verify-full"
root_cert = "/etc/ssl/root.pem"

[checkpoint]
path = "lsn.txt"

[output]
attribute = "payload"
"#;

        let config = ReplicationConfig::parse(toml).unwrap();
        assert_eq!(config.source.database, "orders");
        assert_eq!(config.source.port, 5433);
        assert_eq!(config.source.fetch_limit, 10);
        assert!(config.source.create_slot);
        assert_eq!(config.effective_ssl_mode(), SslMode::VerifyFull);
        assert_eq!(config.tls.root_cert, PathBuf::from("/etc/ssl/root.pem"));
        assert_eq!(config.checkpoint.path, Some(PathBuf::from("lsn.txt")));
        assert_eq!(config.output.attribute, "payload");
    }

    #[test]
    fn test_ssl_mode_names() {
        for mode in [
            SslMode::Disable,
            SslMode::Allow,
            SslMode::Prefer,
            SslMode::Require,
            SslMode::VerifyCa,
            SslMode::VerifyFull,
        ] {
            assert_eq!(mode.as_str().parse::<SslMode>().unwrap(), mode);
        }
        assert_eq!(
            "verify-certificate-authority".parse::<SslMode>().unwrap(),
            SslMode::VerifyCa
        );
        assert!("bogus".parse::<SslMode>().is_err());

        let config =
            ReplicationConfig::parse("[tls]\nenabled = true\nmode = \"verify-certificate-authority\"")
                .unwrap();
        assert_eq!(config.tls.mode, SslMode::VerifyCa);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            ReplicationConfig::parse("[source]\nhostname = \"x\""),
            Err(ConfigError::ParseError(_))
        ));
        assert!(ReplicationConfig::parse("[tls]\nmode = \"bogus\"").is_err());
    }

    #[test]
    fn test_empty_root_cert_allowed() {
        let config =
            ReplicationConfig::parse("[tls]\nenabled = true\nmode = \"verify-full\"\nroot_cert = \"\"")
                .unwrap();
        assert!(config.tls.root_cert.as_os_str().is_empty());
    }

    #[test]
    #[serial]
    fn test_env_references_resolved() {
        std::env::set_var("SLOTSTREAM_TEST_PASSWORD", "s3cret");
        std::env::set_var("SLOTSTREAM_TEST_DIR", "/var/lib/slotstream");

        let config = ReplicationConfig::parse(
            "[source]\npassword = \"${SLOTSTREAM_TEST_PASSWORD}\"\n[checkpoint]\npath = \"${SLOTSTREAM_TEST_DIR}/lsn\"",
        )
        .unwrap();

        assert_eq!(config.source.password, "s3cret");
        assert_eq!(
            config.checkpoint.path,
            Some(PathBuf::from("/var/lib/slotstream/lsn"))
        );

        std::env::remove_var("SLOTSTREAM_TEST_PASSWORD");
        std::env::remove_var("SLOTSTREAM_TEST_DIR");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slotstream.toml");
        std::fs::write(&path, "[source]\nslot = \"from_file\"").unwrap();

        let config = ReplicationConfig::from_file(&path).unwrap();
        assert_eq!(config.source.slot, "from_file");

        let missing = ReplicationConfig::from_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    #[serial]
    fn test_example_config_parses() {
        std::env::set_var("PGPASSWORD", "example");

        let config =
            ReplicationConfig::parse(include_str!("../../../slotstream.example.toml")).unwrap();
        assert_eq!(config.source.password, "example");
        assert_eq!(config.checkpoint.path, Some(PathBuf::from("slotstream.lsn")));
        assert_eq!(config.effective_ssl_mode(), SslMode::Disable);

        std::env::remove_var("PGPASSWORD");
    }
}
