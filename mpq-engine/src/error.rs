//! Error types for mpq-engine
//!
//! Queue operations themselves never fail with an error: broken preconditions
//! panic and "not yet resolvable" is `None`. These errors cover loading
//! configuration and timelines and driving the simulator.

use thiserror::Error;

/// Main error type for mpq-engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors from the shared timeline and config layer
    #[error(transparent)]
    Common(#[from] mpq_common::Error),

    /// Simulation cannot start or continue
    #[error("Simulation error: {0}")]
    Simulation(String),
}

/// Convenience Result type using mpq-engine Error
pub type Result<T> = std::result::Result<T, Error>;
