//! Domain error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of a [`DomainError`], used by callers that map errors
/// onto transport responses or retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation.
    Validation,
    /// Operation not legal for the aggregate's current status.
    InvalidTransition,
    /// The addressed aggregate or record does not exist.
    NotFound,
    /// Optimistic concurrency conflict on save.
    Conflict,
    /// The datastore failed; the whole operation was rolled back.
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::InvalidTransition => "invalid_transition",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Persistence => "persistence",
        };
        f.write_str(name)
    }
}

/// Top-level domain error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The requested operation is not allowed from the current status.
    #[error("invalid transition on {aggregate_type}: cannot {operation} while {from}")]
    InvalidTransition {
        /// Kind of aggregate that rejected the operation.
        aggregate_type: &'static str,
        /// Status the aggregate was in.
        from: String,
        /// Operation (or target status) that was rejected.
        operation: String,
    },

    /// An aggregate was not found.
    #[error("{aggregate_type} not found: {aggregate_id}")]
    AggregateNotFound {
        /// Kind of aggregate that was looked up.
        aggregate_type: &'static str,
        /// Business key that was looked up.
        aggregate_id: String,
    },

    /// An outbox record was not found.
    #[error("outbox record not found: {0}")]
    OutboxRecordNotFound(Uuid),

    /// Optimistic concurrency conflict.
    #[error(
        "concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// A persistence/transaction failure.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl DomainError {
    /// Returns the coarse classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::AggregateNotFound { .. } | Self::OutboxRecordNotFound(_) => ErrorKind::NotFound,
            Self::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

/// Failure of a single delivery attempt to the message bus.
///
/// Recorded on the outbox record only. It never propagates to the business
/// caller whose transaction already committed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The bus did not acknowledge within the per-attempt timeout.
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The bus could not be reached.
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    /// The bus refused the message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The stored envelope could not be decoded or encoded.
    #[error("envelope encoding failed: {0}")]
    Encoding(String),
}
