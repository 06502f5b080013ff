//! Record store error types.

use thiserror::Error;

use crate::firestore::FirestoreError;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by any [`crate::RecordStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid field path: {0}")]
    InvalidFieldPath(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Firestore error: {0}")]
    Firestore(FirestoreError),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn invalid_field_path(path: impl Into<String>) -> Self {
        Self::InvalidFieldPath(path.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Check if the operation may succeed when retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Firestore(e) if e.is_retryable())
    }
}

impl From<FirestoreError> for StoreError {
    fn from(e: FirestoreError) -> Self {
        match e {
            FirestoreError::NotFound(path) => StoreError::NotFound(path),
            FirestoreError::AlreadyExists(path) => StoreError::AlreadyExists(path),
            other => StoreError::Firestore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_firestore_not_found_maps_to_not_found() {
        let err: StoreError = FirestoreError::not_found("videos/abc").into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_retryable_passes_through() {
        let err: StoreError = FirestoreError::RateLimited(100).into();
        assert!(err.is_retryable());
        assert!(!StoreError::not_found("x").is_retryable());
    }
}
