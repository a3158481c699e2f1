//! # Command Line Interface
//!
//! Locates the configuration file and applies per-run overrides.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::Result;

/// Relay GPS positions from a serial device to an HTTP endpoint
#[derive(Debug, Parser)]
#[command(name = "gps-relay", version, about)]
pub struct Args {
    /// TOML configuration file; built-in defaults are used when omitted
    #[arg(short, long, env = "GPS_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serial device path (overrides `serial.port`)
    #[arg(long, env = "GPS_RELAY_PORT")]
    pub port: Option<String>,

    /// Serial baud rate (overrides `serial.baud_rate`)
    #[arg(long, env = "GPS_RELAY_BAUD_RATE")]
    pub baud_rate: Option<u32>,

    /// Update endpoint URL (overrides `forwarder.url`)
    #[arg(long, env = "GPS_RELAY_URL")]
    pub url: Option<String>,

    /// Node id sent with every update (overrides `forwarder.node_id`)
    #[arg(long, env = "GPS_RELAY_NODE_ID")]
    pub node_id: Option<u32>,
}

impl Args {
    /// Load the config file (or defaults), apply overrides, and validate
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud_rate) = self.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(url) = &self.url {
            config.forwarder.url = url.clone();
        }
        if let Some(node_id) = self.node_id {
            config.forwarder.node_id = node_id;
        }
    }
}
