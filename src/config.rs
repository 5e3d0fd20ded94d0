// src/config.rs
//! Configuration file handling and command line overrides

use crate::error::{GpsError, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub serial_port: String,
    pub baudrate: u32,
    pub read_timeout_ms: u64,
    pub reconnect_backoff_secs: u64,
    /// Reconnect after this many consecutive empty reads; `None` waits forever.
    pub max_silent_reads: Option<u32>,
    pub listen_addr: String,
    pub static_dir: PathBuf,
    pub enable_gps: bool,
    pub rpc_url: String,
    pub rpc_method: String,
    pub enable_command: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl RelayConfig {
    /// Get platform-specific default configuration
    pub fn platform_default() -> Self {
        #[cfg(windows)]
        let serial_port = "COM1".to_string();
        #[cfg(not(windows))]
        let serial_port = "/dev/ttyLP7".to_string();

        Self {
            serial_port,
            baudrate: 115_200,
            read_timeout_ms: 1_000,
            reconnect_backoff_secs: 5,
            max_silent_reads: None,
            listen_addr: "0.0.0.0:8801".to_string(),
            static_dir: PathBuf::from("static"),
            enable_gps: true,
            rpc_url: "http://127.0.0.1:8800".to_string(),
            rpc_method: "rpc_ec800m_execute_command".to_string(),
            enable_command: "AT+QGPS=1".to_string(),
        }
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one the per-user file is used if
    /// present, otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::get_config_path() {
                Ok(path) if path.exists() => Self::load_from_file(&path),
                _ => Ok(Self::platform_default()),
            },
        }
    }

    /// Save configuration, creating the directory if needed
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GpsError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| GpsError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(path)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GpsError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            GpsError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;

        Ok(config)
    }

    /// Per-user config file path
    pub fn get_config_path() -> Result<PathBuf> {
        #[cfg(windows)]
        let base = std::env::var("APPDATA").map(PathBuf::from);
        #[cfg(not(windows))]
        let base = std::env::var("HOME").map(|home| PathBuf::from(home).join(".config"));

        let base = base.map_err(|_| GpsError::Config("no home directory to keep config in".to_string()))?;
        Ok(base.join("gps-relay").join("config.json"))
    }

    /// Apply command line overrides on top of file values
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref port) = overrides.serial {
            self.serial_port = port.clone();
        }
        if let Some(baudrate) = overrides.baudrate {
            self.baudrate = baudrate;
        }
        if let Some(timeout) = overrides.read_timeout_ms {
            self.read_timeout_ms = timeout;
        }
        if let Some(backoff) = overrides.backoff_secs {
            self.reconnect_backoff_secs = backoff;
        }
        if overrides.max_silent_reads.is_some() {
            self.max_silent_reads = overrides.max_silent_reads;
        }
        if let Some(ref addr) = overrides.listen {
            self.listen_addr = addr.clone();
        }
        if let Some(ref dir) = overrides.static_dir {
            self.static_dir = dir.clone();
        }
        if let Some(ref url) = overrides.rpc_url {
            self.rpc_url = url.clone();
        }
        if overrides.skip_gps_enable {
            self.enable_gps = false;
        }
    }

    /// Reject settings the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            return Err(GpsError::Config("serial_port must not be empty".to_string()));
        }
        if self.baudrate == 0 {
            return Err(GpsError::Config("baudrate must be positive".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(GpsError::Config("read_timeout_ms must be positive".to_string()));
        }
        if self.max_silent_reads == Some(0) {
            return Err(GpsError::Config("max_silent_reads must be at least 1".to_string()));
        }
        if self.listen_addr.trim().is_empty() {
            return Err(GpsError::Config("listen_addr must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

/// Settings that can be overridden from the command line
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigOverrides {
    /// GPS serial port name
    #[arg(long, value_name = "PATH")]
    pub serial: Option<String>,

    /// GPS serial port baudrate
    #[arg(long)]
    pub baudrate: Option<u32>,

    /// Per-read timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub read_timeout_ms: Option<u64>,

    /// Seconds to wait before reopening a failed port
    #[arg(long, value_name = "SECS")]
    pub backoff_secs: Option<u64>,

    /// Reopen the port after this many consecutive empty reads
    #[arg(long, value_name = "N")]
    pub max_silent_reads: Option<u32>,

    /// Address the HTTP server binds to
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Directory holding index.html
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// JSON-RPC endpoint of the modem hardware manager
    #[arg(long, value_name = "URL")]
    pub rpc_url: Option<String>,

    /// Do not power on the GNSS engine before reading
    #[arg(long)]
    pub skip_gps_enable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        overrides: ConfigOverrides,
    }

    fn scratch_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gps-relay-config-{}-{}", name, std::process::id()))
            .join("config.json")
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        #[cfg(not(windows))]
        assert_eq!(config.serial_port, "/dev/ttyLP7");

        assert_eq!(config.baudrate, 115200);
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(1));
        assert_eq!(config.max_silent_reads, None);
        assert!(config.enable_gps);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"serial_port": "/dev/ttyUSB0", "max_silent_reads": 5}"#).unwrap();

        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.max_silent_reads, Some(5));
        assert_eq!(config.baudrate, 115200);
        assert_eq!(config.listen_addr, "0.0.0.0:8801");
    }

    #[test]
    fn test_command_line_overrides() {
        let cli = TestCli::parse_from([
            "gps-relay",
            "--serial",
            "/dev/ttyACM0",
            "--baudrate",
            "9600",
            "--backoff-secs",
            "1",
            "--skip-gps-enable",
        ]);

        let mut config = RelayConfig::default();
        config.apply(&cli.overrides);

        assert_eq!(config.serial_port, "/dev/ttyACM0");
        assert_eq!(config.baudrate, 9600);
        assert_eq!(config.reconnect_backoff_secs, 1);
        assert!(!config.enable_gps);
        assert_eq!(config.listen_addr, "0.0.0.0:8801");
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let mut config = RelayConfig::default();
        config.baudrate = 0;
        assert!(matches!(config.validate(), Err(GpsError::Config(_))));

        let mut config = RelayConfig::default();
        config.max_silent_reads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let path = scratch_file("roundtrip");
        let mut config = RelayConfig::default();
        config.serial_port = "/dev/ttyS3".to_string();
        config.enable_gps = false;

        config.save(Some(&path)).unwrap();
        let loaded = RelayConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let path = scratch_file("missing");
        assert!(matches!(RelayConfig::load(Some(&path)), Err(GpsError::Config(_))));
    }
}
