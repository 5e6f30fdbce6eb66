//! Error types for Setu

use thiserror::Error;

/// Setu error type
#[derive(Error, Debug)]
pub enum SetuError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport was closed locally or by the peer
    #[error("Transport closed")]
    Closed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Telemetry parse error: {0}")]
    Telemetry(String),
}

impl From<toml::de::Error> for SetuError {
    fn from(e: toml::de::Error) -> Self {
        SetuError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SetuError>;
