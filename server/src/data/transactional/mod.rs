//! Transactional store (PostgreSQL)
//!
//! Canonical row storage keyed `(project_id, id)`. Repositories are free
//! async functions over the shared pool.

mod migrations;
pub mod repositories;
pub mod schema;

use std::time::Duration;

use sqlx::ConnectOptions;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::log::LevelFilter;

use crate::data::DataError;

const DEFAULT_MAX_CONNECTIONS: u32 = 20;
const DEFAULT_MIN_CONNECTIONS: u32 = 2;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Transactional database service; created once at startup.
pub struct TransactionalService {
    pool: PgPool,
}

impl TransactionalService {
    /// Connect, configure the pool and run migrations.
    pub async fn init(database_url: &str) -> Result<Self, DataError> {
        if database_url.is_empty() {
            return Err(DataError::Config("PostgreSQL URL is required".into()));
        }

        let mut options: PgConnectOptions = database_url
            .parse()
            .map_err(|e| DataError::Config(format!("Invalid PostgreSQL URL: {}", e)))?;
        options = options
            .log_statements(LevelFilter::Trace)
            .options([(
                "statement_timeout",
                format!("{}s", DEFAULT_STATEMENT_TIMEOUT_SECS),
            )]);

        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .min_connections(DEFAULT_MIN_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(
            max_connections = DEFAULT_MAX_CONNECTIONS,
            "TransactionalService initialized"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness probe: round-trips a trivial query through the pool.
    pub async fn ping(&self) -> Result<(), DataError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }
}
