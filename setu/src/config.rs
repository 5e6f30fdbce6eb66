//! Configuration loading for Setu

use crate::error::{Result, SetuError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SetuConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Peer connection settings
#[derive(Clone, Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Default peer used by the console when none is given on the command line.
    ///
    /// Examples: `tcp://192.168.4.1:8080`, `serial:///dev/rfcomm0`
    #[serde(default)]
    pub peer: Option<String>,

    /// TCP connect timeout in milliseconds (default: 5000)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Serial baud rate (default: 9600, the factory rate of HC-05/HC-06 SPP modules)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Serial read timeout in milliseconds; bounds how long a closed port
    /// takes to wake the drain loop (default: 100)
    #[serde(default = "default_read_poll")]
    pub read_poll_ms: u64,
}

/// Session manager tuning
#[derive(Clone, Debug, Deserialize)]
pub struct LinkConfig {
    /// Bytes requested per transport read (default: 1024)
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Inbound lines longer than this are dropped (default: 512)
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Unread telemetry events held per subscriber before new ones are dropped (default: 256)
    #[serde(default = "default_subscriber_backlog")]
    pub subscriber_backlog: usize,
}

/// Command history settings
#[derive(Clone, Debug, Deserialize)]
pub struct HistoryConfig {
    /// Number of command records kept, newest first (default: 20)
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

/// Logging settings
#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (default: "setu=info")
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_connect_timeout() -> u64 {
    5000
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_read_poll() -> u64 {
    100
}
fn default_read_chunk_size() -> usize {
    1024
}
fn default_max_line_len() -> usize {
    512
}
fn default_subscriber_backlog() -> usize {
    256
}
fn default_history_capacity() -> usize {
    20
}
fn default_log_level() -> String {
    "setu=info".to_string()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            peer: None,
            connect_timeout_ms: default_connect_timeout(),
            baud_rate: default_baud_rate(),
            read_poll_ms: default_read_poll(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: default_read_chunk_size(),
            max_line_len: default_max_line_len(),
            subscriber_backlog: default_subscriber_backlog(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }
}

impl SetuConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SetuError::Config(format!("Failed to read config file: {}", e)))?;
        let config: SetuConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session manager cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.connection.connect_timeout_ms == 0 {
            return Err(SetuError::Config(
                "connection.connect_timeout_ms must be > 0".into(),
            ));
        }
        if self.connection.read_poll_ms == 0 {
            return Err(SetuError::Config("connection.read_poll_ms must be > 0".into()));
        }
        if self.link.read_chunk_size == 0 {
            return Err(SetuError::Config("link.read_chunk_size must be > 0".into()));
        }
        if self.link.max_line_len == 0 {
            return Err(SetuError::Config("link.max_line_len must be > 0".into()));
        }
        if self.link.subscriber_backlog == 0 {
            return Err(SetuError::Config("link.subscriber_backlog must be > 0".into()));
        }
        if self.history.capacity == 0 {
            return Err(SetuError::Config("history.capacity must be > 0".into()));
        }
        Ok(())
    }
}
