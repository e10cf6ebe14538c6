// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::backend::BackendError;
use super::filter::FilterError;
use super::repository::RepositoryError;

/// Errors surfaced by cortex operations.
///
/// Read paths (search, snapshots) absorb backend failures; write paths
/// (create, reinforce, downgrade) return them.
#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),

    #[error("Pattern not found: {0}")]
    NotFound(String),

    #[error("Pattern already exists: {0}")]
    Conflict(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl CortexError {
    /// Transient errors are retried; validation, not-found and conflict never are.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CortexError::Transient(_) | CortexError::Repository(RepositoryError::Database(_))
        )
    }
}

impl From<RepositoryError> for CortexError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => CortexError::NotFound(what),
            RepositoryError::Conflict(what) => CortexError::Conflict(what),
            RepositoryError::VersionConflict { .. } => CortexError::Transient(err.to_string()),
            other => CortexError::Repository(other),
        }
    }
}

impl From<BackendError> for CortexError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(_) | BackendError::Network(_) => CortexError::Transient(err.to_string()),
            BackendError::Unavailable(what) => CortexError::BackendUnavailable(what),
            BackendError::Rejected(what) => CortexError::Validation(what),
            BackendError::InvalidResponse(what) => CortexError::Transient(what),
        }
    }
}

pub type CortexResult<T> = Result<T, CortexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(CortexError::Transient("reset".into()).is_retryable());
        assert!(CortexError::from(RepositoryError::Database("connection reset".into())).is_retryable());
        assert!(!CortexError::Validation("bad".into()).is_retryable());
        assert!(!CortexError::from(RepositoryError::NotFound("x".into())).is_retryable());
        assert!(!CortexError::from(RepositoryError::Conflict("x".into())).is_retryable());
    }

    #[test]
    fn test_version_conflict_is_transient() {
        let err = CortexError::from(RepositoryError::VersionConflict {
            id: crate::domain::pattern::PatternId::new(),
            expected: 3,
        });
        assert!(matches!(err, CortexError::Transient(_)));
    }
}
