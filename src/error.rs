//! Error types for workline core operations.

use thiserror::Error;
use uuid::Uuid;

use crate::models::EntityKind;

/// Errors returned by workspace mutations, lookups and the notification engine.
///
/// Every variant is a plain return value. A failed operation leaves the
/// workspace and engine exactly as they were before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A field value was rejected: empty name, negative hours, an end date
    /// before the start date, a no-op status transition, or a malformed
    /// snapshot.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The identifier is not present in the current tree or notification set.
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: Uuid },
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn not_found(kind: EntityKind, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias using the workline Error type.
pub type Result<T> = std::result::Result<T, Error>;
