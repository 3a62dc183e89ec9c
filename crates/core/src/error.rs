//! Domain error model.

use thiserror::Error;

/// Result type used by aggregates, projectors and handler tables.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures raised by business artifacts
/// (validation, invariants, handler resolution). Store conflicts live with the
/// store that detects them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A message failed validation (e.g. malformed payload).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// No handler is registered for the given message name.
    #[error("no handler registered for {0}")]
    MissingHandler(String),

    /// A handler was registered twice for the same message name.
    #[error("handler already registered for {0}")]
    DuplicateHandler(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn missing_handler(name: impl Into<String>) -> Self {
        Self::MissingHandler(name.into())
    }
}
