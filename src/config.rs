//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every value is fixed for the lifetime of the process: the config is built
//! once at startup and handed by reference to the serial reader and the
//! forwarder.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{GpsRelayError, Result};

/// Baud rates accepted for the GPS serial link
pub const SUPPORTED_BAUD_RATES: &[u32] = &[
    9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub forwarder: ForwarderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Delay between two checks for incoming bytes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// HTTP forwarder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ForwarderConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_node_id")]
    pub node_id: u32,

    /// Request timeout. `None` leaves the transport default (no timeout).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            node_id: default_node_id(),
            timeout_ms: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
        }
    }
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_poll_interval_ms() -> u64 { 1000 }

fn default_url() -> String { "http://127.0.0.1:8080/api/update".to_string() }
fn default_node_id() -> u32 { 1 }

fn default_log_level() -> String { "info".to_string() }

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ForwarderConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn invalid(msg: impl std::fmt::Display) -> GpsRelayError {
    GpsRelayError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gps_relay::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Called by [`Config::load`]; call it again after applying command line
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {}",
                SUPPORTED_BAUD_RATES
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        if self.serial.poll_interval_ms == 0 || self.serial.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        let url = reqwest::Url::parse(&self.forwarder.url).map_err(|e| {
            invalid(format!("forwarder url '{}' is invalid: {}", self.forwarder.url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(invalid("forwarder url must use http or https"));
        }

        if let Some(timeout_ms) = self.forwarder.timeout_ms {
            if timeout_ms == 0 || timeout_ms > 600_000 {
                return Err(invalid("timeout_ms must be between 1 and 600000"));
            }
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(invalid("log level must be one of: trace, debug, info, warn, error"));
        }

        if matches!(&self.logging.log_dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("log_dir cannot be empty when set"));
        }

        Ok(())
    }
}
