//! Ingestion processing errors
//!
//! Processor failures surface per-event in the 207 response; they never
//! fail the batch.

use thiserror::Error;

use crate::data::DataError;
use crate::domain::events::ValidationError;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("Access denied: {0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Event processing timed out")]
    Timeout,
    #[error(transparent)]
    Storage(#[from] DataError),
}

impl IngestionError {
    /// HTTP-style status for the per-event error list.
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Timeout => 408,
            Self::Storage(_) => 500,
        }
    }

    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            IngestionError::Validation(ValidationError::Schema("x".into())).status(),
            400
        );
        assert_eq!(IngestionError::Forbidden("t".into()).status(), 403);
        assert_eq!(IngestionError::NotFound("observation".into()).status(), 404);
        assert_eq!(IngestionError::Timeout.status(), 408);
        assert_eq!(
            IngestionError::Storage(DataError::Config("x".into())).status(),
            500
        );
    }

    #[test]
    fn only_transient_storage_errors_retry() {
        assert!(IngestionError::Storage(DataError::blob("io")).is_transient());
        assert!(!IngestionError::Timeout.is_transient());
        assert!(!IngestionError::NotFound("trace".into()).is_transient());
    }
}
