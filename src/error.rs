//! # Error Types
//!
//! Custom error types for GPS Relay using `thiserror`.

use thiserror::Error;

/// Main error type for GPS Relay
#[derive(Debug, Error)]
pub enum GpsRelayError {
    /// Serial port errors (open failures, read failures)
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// HTTP client errors (client construction, not per-request failures)
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for GPS Relay
pub type Result<T> = std::result::Result<T, GpsRelayError>;
