//! Analytical store (ClickHouse)
//!
//! High-throughput inserts for ingested entities and the read paths behind
//! the list/detail endpoints and the query engine.

pub mod repositories;
pub mod schema;

use clickhouse::Client;

use crate::data::DataError;

/// ClickHouse connection settings
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Analytical database service; created once at startup.
#[derive(Clone)]
pub struct AnalyticsService {
    client: Client,
}

impl AnalyticsService {
    /// Connect and apply the schema.
    pub async fn init(config: &AnalyticsConfig) -> Result<Self, DataError> {
        let client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database)
            .with_user(&config.user)
            .with_password(&config.password);

        for statement in schema::SCHEMA_STATEMENTS {
            client.query(statement).execute().await?;
        }

        tracing::debug!(url = %config.url, database = %config.database, "AnalyticsService initialized");
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Liveness probe: round-trips a trivial query through the server.
    pub async fn ping(&self) -> Result<(), DataError> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await?;
        Ok(())
    }
}
