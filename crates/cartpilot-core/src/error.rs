//! CartPilot error types.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CartPilotError>;

/// Errors shared across CartPilot crates.
#[derive(Debug, Error)]
pub enum CartPilotError {
    /// Configuration file could not be read, parsed, or written.
    #[error("Config error: {0}")]
    Config(String),

    /// Input rejected before any work started.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Persistence layer failure (schedule store, history db).
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
