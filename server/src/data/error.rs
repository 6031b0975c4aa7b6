//! Unified error type for the data layer
//!
//! Wraps backend-specific errors while preserving which backend produced
//! them, so callers can decide on retry without downcasting.

use thiserror::Error;

/// Unified error type for data layer operations
#[derive(Error, Debug)]
pub enum DataError {
    /// PostgreSQL error (transactional backend)
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// ClickHouse error (analytical backend)
    #[error("ClickHouse error: {0}")]
    Clickhouse(#[from] clickhouse::error::Error),

    /// Blob store error (S3-compatible)
    #[error("Blob store error: {0}")]
    Blob(String),

    /// Migration failed
    #[error("Migration {version} ({name}) failed on {backend}: {error}")]
    MigrationFailed {
        backend: &'static str,
        version: i32,
        name: String,
        error: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization of a stored JSON column failed
    #[error("Corrupt stored JSON in {context}: {error}")]
    CorruptJson { context: &'static str, error: String },

    /// Conflict (duplicate entry, constraint violation surfaced as domain rule)
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DataError {
    pub fn blob(message: impl Into<String>) -> Self {
        Self::Blob(message.into())
    }

    pub fn corrupt_json(context: &'static str, error: impl std::fmt::Display) -> Self {
        Self::CorruptJson {
            context,
            error: error.to_string(),
        }
    }

    /// Whether the operation is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Postgres(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            Self::Clickhouse(e) => {
                let text = e.to_string();
                text.contains("connection") || text.contains("timeout") || text.contains("network")
            }
            Self::Blob(_) | Self::Io(_) => true,
            _ => false,
        }
    }

    /// The backend that produced this error.
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Clickhouse(_) => "clickhouse",
            Self::Blob(_) => "blob",
            Self::MigrationFailed { backend, .. } => backend,
            Self::Config(_) | Self::Io(_) | Self::CorruptJson { .. } | Self::Conflict(_) => {
                "unknown"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_failed_display() {
        let err = DataError::MigrationFailed {
            backend: "postgres",
            version: 2,
            name: "add_scores".to_string(),
            error: "syntax error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Migration 2 (add_scores) failed on postgres: syntax error"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(DataError::blob("socket closed").is_transient());
        assert!(!DataError::Config("bad dsn".into()).is_transient());
        assert!(!DataError::Conflict("dup".into()).is_transient());
    }

    #[test]
    fn backend_attribution() {
        assert_eq!(DataError::blob("x").backend(), "blob");
        assert_eq!(DataError::Config("x".into()).backend(), "unknown");
    }
}
