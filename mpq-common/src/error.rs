//! Common error types for MPQ

use thiserror::Error;

/// Common result type for MPQ operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across MPQ crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML document could not be parsed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeline description is structurally invalid
    #[error("Invalid timeline: {0}")]
    InvalidTimeline(String),
}
