//! Error types for the resolution engine.
//!
//! All errors are strongly typed using thiserror. Ambiguity is deliberately
//! absent here: an ambiguous discovery is a first-class terminal state on the
//! proto record, not a failure. Realization validation failures are recorded
//! on the proto and never raised across the produced API boundary.

use thiserror::Error;

use crate::entity::{EntityId, EntityKind};
use crate::repository::RepositoryError;

/// Errors raised while normalizing a record's raw fields.
///
/// Normalization is fatal to the discovery call that triggered it; the
/// engine does not guess at missing data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("required field '{field}' is missing or null")]
    MissingField { field: String },
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Which field failed, or a blank string for record-level failures.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// Domain validation failure from a realizer commit.
///
/// Carried inside the proto record's failure slot rather than propagated,
/// so batch callers can keep processing other records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The individual field failures, in the order they were reported.
    pub errors: Vec<FieldError>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: {}", self.summary())
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Creates a record-level validation error with a single message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: String::new(),
                message: message.into(),
            }],
        }
    }

    /// Creates a validation error for a single field.
    #[must_use]
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Adds another field failure.
    #[must_use]
    pub fn and_field(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
        self
    }

    fn summary(&self) -> String {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| {
                if e.field.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.field, e.message)
                }
            })
            .collect();
        parts.join("; ")
    }
}

/// Top-level error type for the resolution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("normalization error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("no profile registered for entity kind '{kind}'")]
    UnknownKind { kind: EntityKind },

    #[error("cannot consolidate an entity into itself: {id}")]
    SelfConsolidation { id: EntityId },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a normalization error.
    #[must_use]
    pub const fn is_normalize(&self) -> bool {
        matches!(self, Self::Normalize(_))
    }

    /// Returns true if this is a repository error.
    #[must_use]
    pub const fn is_repository(&self) -> bool {
        matches!(self, Self::Repository(_))
    }

    /// Returns true if this error is safe to retry by re-running the call.
    ///
    /// Repository failures are retryable because discovery clears prior
    /// candidates before doing any other work; normalization and
    /// configuration errors will not change on retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Repository(_))
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
