// src/config.rs

//! Startup configuration, loaded once from TOML. Nothing here changes at runtime.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Smallest slot that can still hold a heartbeat object
pub const MIN_MESSAGE_LEN: usize = 16;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Identity placed in the "D" field of every outgoing message
    pub device_name: String,
    pub heartbeat_period_ms: u64,
    /// Number of slots in the outbound queue
    pub queue_capacity: usize,
    /// Slot size in bytes; every transmitted frame has exactly this length
    pub max_message_len: usize,
    pub transport: TransportConfig,
    pub scanner: ScannerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    pub broadcast_ip: String,
    pub port: u16,
    /// Radio channel of the broadcast peer (0 = current channel)
    pub channel: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// How often the scan switches channels
    pub interval_ms: u64,
    /// How long each scan window lasts within the interval
    pub window_ms: u64,
    /// Request scan responses from advertisers
    pub active: bool,
    /// How often the supervisor checks that the scan is still running
    pub restart_check_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level (trace, debug, info, warn, error); RUST_LOG overrides
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: "ESP-GOVEE".to_string(),
            heartbeat_period_ms: 10_000,
            queue_capacity: 10,
            max_message_len: 200,
            transport: TransportConfig::default(),
            scanner: ScannerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            broadcast_ip: "255.255.255.255".to_string(),
            port: 4210,
            channel: 0,
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 97,
            window_ms: 37,
            active: true,
            restart_check_ms: 2_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_name.is_empty() {
            return Err(Error::InvalidConfig("device_name is empty".into()));
        }
        if self.heartbeat_period_ms == 0 {
            return Err(Error::InvalidConfig("heartbeat_period_ms must be > 0".into()));
        }
        // one slot is always held back for the heartbeat
        if self.queue_capacity < 2 {
            return Err(Error::InvalidConfig(format!(
                "queue_capacity must be >= 2, got {}",
                self.queue_capacity
            )));
        }
        if self.max_message_len < MIN_MESSAGE_LEN {
            return Err(Error::InvalidConfig(format!(
                "max_message_len must be >= {}, got {}",
                MIN_MESSAGE_LEN, self.max_message_len
            )));
        }
        if self.scanner.window_ms > self.scanner.interval_ms {
            return Err(Error::InvalidConfig(format!(
                "scan window {}ms exceeds interval {}ms",
                self.scanner.window_ms, self.scanner.interval_ms
            )));
        }
        Ok(())
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_millis(self.heartbeat_period_ms)
    }
}
