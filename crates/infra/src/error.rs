//! Infrastructure error types.
//!
//! These are **infrastructure errors** (storage, concurrency, transport) as
//! opposed to domain errors (validation, invariants). `NotFound` is a signal
//! rather than a fault: reconcilers branch on it to decide between create and
//! update.

use thiserror::Error;

use holdings_core::{DomainError, ValidationErrors};

/// Store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No record matched the key or predicate.
    #[error("record not found")]
    NotFound,

    /// Version mismatch or uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store rejected the record shape (check constraint etc).
    #[error("invalid record: {0}")]
    Invalid(String),

    /// Anything else: connection loss, pool closed, poisoned lock.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => StoreError::NotFound,
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::Validation(errors) => StoreError::Invalid(errors.to_string()),
            DomainError::InvalidId(msg) => StoreError::Invalid(msg),
        }
    }
}

/// Failure of a reconciliation (grant or replica merge).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReconcileError {
    /// Input rejected before any store access.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt lost a race with a concurrent writer.
    #[error("gave up after {attempts} conflicting attempts")]
    Exhausted { attempts: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_onto_store_errors() {
        assert_eq!(StoreError::from(DomainError::not_found()), StoreError::NotFound);
        assert!(StoreError::from(DomainError::conflict("stale")).is_conflict());
        assert!(matches!(
            StoreError::from(DomainError::invalid_id("bad")),
            StoreError::Invalid(_)
        ));
    }
}
