//! Error types for the event runtime.
//!
//! Only the scheduling-input error is a recoverable `Result`; programmer
//! contract violations (reading an undecided pick, recursive `sync` from a
//! canceller, deciding a foreign pick) are panics, not error values.

use std::time::Duration;
use thiserror::Error;

/// Result type for fallible runtime operations.
pub type CmlResult<T> = Result<T, CmlError>;

/// Errors the runtime surfaces through `Result` rather than panicking.
#[derive(Error, Debug)]
pub enum CmlError {
    /// `schedule`/`schedule_interval` was asked for a non-positive duration.
    #[error("timer duration must be positive, got {duration:?}")]
    InvalidDuration { duration: Duration },

    /// A wheel configuration with zero levels or a zero-slot level.
    #[error("invalid timing wheel configuration: {0}")]
    InvalidWheelConfig(String),

    /// Configuration could not be parsed from its source representation.
    #[error("failed to parse wheel configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
