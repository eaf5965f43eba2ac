//! # CartPilot Core
//!
//! Shared foundation for all CartPilot crates: the TOML configuration system,
//! the crate-wide error type, and the execution outcome model that the
//! scheduler, browser, and gateway crates all agree on.

pub mod config;
pub mod error;
pub mod outcome;

pub use config::CartPilotConfig;
pub use error::{CartPilotError, Result};
pub use outcome::{ExecutionOutcome, OutcomeStatus, TriggeredBy};
