//! Error types for graphopt planning operations.

use thiserror::Error;

/// Result type alias using [`GraphOptError`].
pub type Result<T> = std::result::Result<T, GraphOptError>;

/// Error types for graphopt planning operations.
#[derive(Debug, Error)]
pub enum GraphOptError {
    /// An invariant the optimizer relies on does not hold.
    ///
    /// This always indicates a defect in the compiler, never bad user input.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// A plan fragment handed to the optimizer is structurally malformed.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// Invalid optimizer configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GraphOptError {
    /// Creates an internal error from anything printable.
    pub fn internal(message: impl Into<String>) -> Self {
        GraphOptError::InternalError(message.into())
    }

    /// Returns true if this error signals a broken compiler invariant.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, GraphOptError::InternalError(_))
    }
}
