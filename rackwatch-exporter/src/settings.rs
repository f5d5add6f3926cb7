// Rackwatch Exporter - Configuration loading
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Exporter configuration, read from a TOML file.
//!
//! ```toml
//! [exporter]
//! listen = "0.0.0.0:5000"
//! interval_secs = 15
//! snapshot_path = "sensors_snapshot.json"
//! rack_id = "R01"
//!
//! [timeouts]
//! bmc_secs = 15
//!
//! [credentials.bmc]
//! username = "admin"
//! password = "password"
//!
//! [[servers]]
//! ip_address = "10.0.0.11"
//! name = "node-1"
//! rack_name = "R01"
//!
//! [[psus]]
//! ip_address = "10.0.1.1"
//! name = "shelf-1"
//! rack_name = "R01"
//!
//! [[cdu]]
//! url = "http://10.0.2.1/api/v1/data"
//! rack_name = "R01"
//! ```

use rackwatch::{CduDescriptor, EngineConfig, SourceDescriptor};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that end the exporter at startup.
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Configuration file could not be read
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration parsed but a value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// HTTP server stopped with an error
    #[error("Server error: {0}")]
    Server(#[source] std::io::Error),
}

/// Result type alias for exporter startup
pub type Result<T> = std::result::Result<T, ExporterError>;

/// `[exporter]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterSection {
    /// Address the HTTP server listens on (default: 0.0.0.0:5000)
    pub listen: SocketAddr,

    /// Seconds between poll cycles (default: 15)
    pub interval_secs: u64,

    /// Fetch the three source groups concurrently (default: false)
    pub parallel: bool,

    /// Where the per-cycle snapshot is written. Disabled when unset.
    pub snapshot_path: Option<PathBuf>,

    /// CDU document read instead of the CDU URL when the file exists
    pub cdu_fixture_path: Option<PathBuf>,

    /// Engine settings: `failure_threshold`, `stall_speed`, `rack_id`
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 5000)),
            interval_secs: 15,
            parallel: false,
            snapshot_path: None,
            cdu_fixture_path: None,
            engine: EngineConfig::default(),
        }
    }
}

/// `[timeouts]` table, per source kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub bmc_secs: u64,
    pub powershelf_secs: u64,
    pub cdu_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            bmc_secs: 15,
            powershelf_secs: 10,
            cdu_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn bmc(&self) -> Duration {
        Duration::from_secs(self.bmc_secs)
    }

    pub fn powershelf(&self) -> Duration {
        Duration::from_secs(self.powershelf_secs)
    }

    pub fn cdu(&self) -> Duration {
        Duration::from_secs(self.cdu_secs)
    }
}

/// HTTP basic credentials.
#[derive(Clone, PartialEq, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// `[credentials.*]` tables.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub bmc: Option<BasicAuth>,
    pub powershelf: Option<BasicAuth>,
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub exporter: ExporterSection,
    pub timeouts: Timeouts,
    pub credentials: Credentials,
    pub servers: Vec<SourceDescriptor>,
    pub psus: Vec<SourceDescriptor>,
    pub cdu: Vec<CduDescriptor>,
}

impl ExporterConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ExporterError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ExporterError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.exporter.interval_secs == 0 {
            return Err(ExporterError::InvalidConfig(
                "exporter.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.exporter.engine.failure_threshold == 0 {
            return Err(ExporterError::InvalidConfig(
                "exporter.failure_threshold must be at least 1".to_string(),
            ));
        }
        let timeouts = &self.timeouts;
        if timeouts.bmc_secs == 0 || timeouts.powershelf_secs == 0 || timeouts.cdu_secs == 0 {
            return Err(ExporterError::InvalidConfig(
                "timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.exporter.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[exporter]
listen = "127.0.0.1:9105"
interval_secs = 30
parallel = true
snapshot_path = "/var/lib/rackwatch/sensors_snapshot.json"
failure_threshold = 3
rack_id = "R01"

[timeouts]
bmc_secs = 20

[credentials.bmc]
username = "admin"
password = "secret"

[[servers]]
ip_address = "10.0.0.11"
name = "node-1"
rack_name = "R01"

[[servers]]
ip_address = "10.0.0.12"

[[psus]]
ip_address = "10.0.1.1"
name = "shelf-1"
rack_name = "R01"

[[cdu]]
url = "http://10.0.2.1/api/v1/data"
rack_name = "R01"

[[cdu]]
rack_name = "R02"
"#;

    #[test]
    fn test_parse_sample() {
        let config: ExporterConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.exporter.listen.port(), 9105);
        assert_eq!(config.interval(), Duration::from_secs(30));
        assert!(config.exporter.parallel);
        assert_eq!(config.exporter.engine.failure_threshold, 3);
        assert_eq!(config.exporter.engine.rack_id, "R01");
        assert_eq!(config.exporter.engine.stall_speed, 100.0);

        assert_eq!(config.timeouts.bmc(), Duration::from_secs(20));
        assert_eq!(config.timeouts.powershelf(), Duration::from_secs(10));

        let bmc = config.credentials.bmc.as_ref().unwrap();
        assert_eq!(bmc.username, "admin");
        assert!(config.credentials.powershelf.is_none());

        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[1].display_name(), "10.0.0.12");
        assert_eq!(config.servers[1].rack_name, "unknown");
        assert_eq!(config.psus[0].display_name(), "shelf-1");
        assert!(config.cdu[1].url.is_none());
    }

    #[test]
    fn test_defaults() {
        let config: ExporterConfig = toml::from_str("").unwrap();
        assert_eq!(config.exporter.listen.port(), 5000);
        assert_eq!(config.exporter.interval_secs, 15);
        assert!(!config.exporter.parallel);
        assert!(config.exporter.snapshot_path.is_none());
        assert_eq!(config.exporter.engine.failure_threshold, 2);
        assert_eq!(config.timeouts, Timeouts::default());
        assert!(config.servers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let config: ExporterConfig =
            toml::from_str(include_str!("../rackwatch.example.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.exporter.snapshot_path.as_deref(),
            Some(Path::new("sensors_snapshot.json"))
        );
        assert_eq!(config.credentials.powershelf.unwrap().username, "root");
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config: ExporterConfig = toml::from_str("[exporter]\ninterval_secs = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ExporterError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = ExporterConfig::load(file.path()).unwrap();
        assert_eq!(config.cdu.len(), 2);
    }

    #[test]
    fn test_load_errors() {
        let missing = ExporterConfig::load(Path::new("/nonexistent/rackwatch.toml"));
        assert!(matches!(missing, Err(ExporterError::ConfigRead { .. })));

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[exporter\nlisten = ").unwrap();
        let invalid = ExporterConfig::load(file.path());
        assert!(matches!(invalid, Err(ExporterError::ConfigParse { .. })));
    }

    #[test]
    fn test_password_not_debug_printed() {
        let auth = BasicAuth {
            username: "root".into(),
            password: Some("0penBmc".into()),
        };
        let printed = format!("{auth:?}");
        assert!(printed.contains("root"));
        assert!(!printed.contains("0penBmc"));
    }
}
