//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// conflicts, exhausted stock). `StoreUnavailable` is the one retryable kind;
/// everything else is permanent for the given input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, return exceeding
    /// the allocated quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated. Signals a defect in the caller, not
    /// bad user input (e.g. a counter adjustment that would break bounds).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested material/serial/allocation was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (serial already in use, duplicate serial number,
    /// deletion blocked by outstanding usage).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested quantity (or serial) is not available.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u64, available: u64 },

    /// Lifecycle transition not permitted from the current state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The underlying store failed; the caller may retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn insufficient_stock(requested: u64, available: u64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Whether the caller may meaningfully retry the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}
