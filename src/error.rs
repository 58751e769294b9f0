//! Error types for the tokkakari core.
//!
//! Failure policy:
//! - Corrupt stored values are absorbed at the read boundary (treated
//!   as absent) and never surface as errors.
//! - Quota failures trigger one emergency-cleanup-and-retry cycle; only
//!   the second failure reaches the caller, as [`Error::QuotaExhausted`].
//! - Invalid operations (completing a non-current step, executing a
//!   task with no steps) are rejected at the operation boundary, never
//!   silently repaired.

use thiserror::Error;

/// Main error type for tokkakari operations
#[derive(Error, Debug)]
pub enum Error {
    // Storage failures
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Storage quota still exceeded after emergency cleanup")]
    QuotaExhausted,

    // Invalid operations
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("No progress record for task: {0}")]
    NoProgress(String),

    #[error("Task has no steps to execute: {0}")]
    NoSteps(String),

    #[error("Step {index} is not the current step (current: {current})")]
    StepNotCurrent { index: usize, current: usize },

    #[error("Step index {index} out of range (steps: {len})")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // External collaborators
    #[error("Breakdown service failed: {0}")]
    ServiceFailure(String),

    // Wrapped lower-level failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Whether this error is a storage-quota failure (first or final).
    pub fn is_quota(&self) -> bool {
        matches!(self, Error::QuotaExceeded | Error::QuotaExhausted)
    }

    /// Whether the operation was rejected at its boundary rather than
    /// failing mid-flight.
    pub fn is_invalid_operation(&self) -> bool {
        matches!(
            self,
            Error::TaskNotFound(_)
                | Error::NoProgress(_)
                | Error::NoSteps(_)
                | Error::StepNotCurrent { .. }
                | Error::StepOutOfRange { .. }
                | Error::InvalidArgument(_)
        )
    }
}

/// Result type alias for tokkakari operations
pub type Result<T> = std::result::Result<T, Error>;
