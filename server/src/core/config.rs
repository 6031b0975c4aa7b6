//! Environment configuration
//!
//! All runtime configuration is read from environment variables at startup
//! and held in one immutable `Config`.

use std::str::FromStr;

use anyhow::{Context, Result, bail};

use super::constants::{
    DEFAULT_HOST, DEFAULT_INGESTION_DEADLINE_MS, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MEDIA_DOWNLOAD_URL_EXPIRY_SECS, DEFAULT_MEDIA_MAX_CONTENT_LENGTH,
    DEFAULT_MEDIA_UPLOAD_URL_EXPIRY_SECS, DEFAULT_PORT,
};

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => bail!("Invalid LOG_FORMAT: {other} (expected text or json)"),
        }
    }
}

/// Server runtime configuration, resolved once at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,

    /// Postgres DSN for the transactional store
    pub database_url: String,

    /// ClickHouse HTTP endpoint + credentials
    pub clickhouse_url: String,
    pub clickhouse_db: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,

    /// S3-compatible blob store; `None` endpoint means AWS default chain
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub media_bucket: Option<String>,
    pub event_log_bucket: Option<String>,

    pub media_max_content_length: u64,
    pub media_upload_url_expiry_secs: u64,
    pub media_download_url_expiry_secs: u64,

    pub max_batch_size: usize,
    pub ingestion_deadline_ms: u64,
    /// Read observations from the raw `events` table instead of the
    /// materialized observations view
    pub enable_events_table_observations: bool,

    /// HMAC pepper for API-key hashing
    pub api_key_pepper: Vec<u8>,

    /// Optional first-run seed: organization, project and a project API
    /// key created when absent (all three must be set together)
    pub init_org_id: Option<String>,
    pub init_project_id: Option<String>,
    pub init_secret_key: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_opt(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {name}: {e}")),
        None => Ok(default),
    }
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `.env` files are honored when present (development convenience);
    /// real environment variables win over file entries.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url =
            env_opt("DATABASE_URL").context("DATABASE_URL is required (Postgres DSN)")?;
        let api_key_pepper = env_opt("API_KEY_PEPPER")
            .context("API_KEY_PEPPER is required (HMAC secret for API-key hashing)")?
            .into_bytes();

        Ok(Self {
            host: env_opt("LUMITRACE_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: env_parse("LUMITRACE_PORT", DEFAULT_PORT)?,
            log_format: env_parse("LOG_FORMAT", LogFormat::Text)?,
            database_url,
            clickhouse_url: env_opt("CLICKHOUSE_URL")
                .unwrap_or_else(|| "http://localhost:8123".to_string()),
            clickhouse_db: env_opt("CLICKHOUSE_DB").unwrap_or_else(|| "lumitrace".to_string()),
            clickhouse_user: env_opt("CLICKHOUSE_USER").unwrap_or_else(|| "default".to_string()),
            clickhouse_password: env_opt("CLICKHOUSE_PASSWORD").unwrap_or_default(),
            s3_endpoint: env_opt("S3_ENDPOINT"),
            s3_region: env_opt("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            media_bucket: env_opt("MEDIA_BUCKET"),
            event_log_bucket: env_opt("EVENT_LOG_BUCKET"),
            media_max_content_length: env_parse(
                "MEDIA_MAX_CONTENT_LENGTH",
                DEFAULT_MEDIA_MAX_CONTENT_LENGTH,
            )?,
            media_upload_url_expiry_secs: env_parse(
                "MEDIA_UPLOAD_URL_EXPIRY_SECS",
                DEFAULT_MEDIA_UPLOAD_URL_EXPIRY_SECS,
            )?,
            media_download_url_expiry_secs: env_parse(
                "MEDIA_DOWNLOAD_URL_EXPIRY_SECS",
                DEFAULT_MEDIA_DOWNLOAD_URL_EXPIRY_SECS,
            )?,
            max_batch_size: env_parse("MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?,
            ingestion_deadline_ms: env_parse(
                "INGESTION_DEADLINE_MS",
                DEFAULT_INGESTION_DEADLINE_MS,
            )?,
            enable_events_table_observations: env_parse(
                "ENABLE_EVENTS_TABLE_OBSERVATIONS",
                false,
            )?,
            api_key_pepper,
            init_org_id: env_opt("LUMITRACE_INIT_ORG_ID"),
            init_project_id: env_opt("LUMITRACE_INIT_PROJECT_ID"),
            init_secret_key: env_opt("LUMITRACE_INIT_SECRET_KEY"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("TEXT".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
