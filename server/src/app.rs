//! Application wiring
//!
//! Builds every service from configuration and runs the HTTP server until
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::api::server::{AppState, build_router};
use crate::core::{Config, LogFormat};
use crate::data::analytics::AnalyticsConfig;
use crate::data::blob::{BlobStorage, EventLog, S3BlobStorage};
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::ingestion::IngestionOrchestrator;
use crate::domain::media::MediaService;

pub struct CoreApp;

impl CoreApp {
    pub async fn run() -> Result<()> {
        let config = Arc::new(Config::from_env()?);
        init_tracing(config.log_format);

        let transactional = Arc::new(
            TransactionalService::init(&config.database_url)
                .await
                .context("Failed to initialize the transactional store")?,
        );
        let analytics = Arc::new(
            AnalyticsService::init(&AnalyticsConfig {
                url: config.clickhouse_url.clone(),
                database: config.clickhouse_db.clone(),
                user: config.clickhouse_user.clone(),
                password: config.clickhouse_password.clone(),
            })
            .await
            .context("Failed to initialize the analytical store")?,
        );

        bootstrap_from_env(&config, &transactional).await?;

        let event_log = match &config.event_log_bucket {
            Some(bucket) => {
                let storage = S3BlobStorage::new(
                    bucket.clone(),
                    config.s3_region.clone(),
                    config.s3_endpoint.clone(),
                )
                .await
                .context("Failed to initialize the event-log bucket")?;
                Some(EventLog::new(Arc::new(storage)))
            }
            None => {
                tracing::warn!("EVENT_LOG_BUCKET not set; raw events will not be preserved");
                None
            }
        };

        let media = match &config.media_bucket {
            Some(bucket) => {
                let storage: Arc<dyn BlobStorage> = Arc::new(
                    S3BlobStorage::new(
                        bucket.clone(),
                        config.s3_region.clone(),
                        config.s3_endpoint.clone(),
                    )
                    .await
                    .context("Failed to initialize the media bucket")?,
                );
                Some(Arc::new(MediaService::new(
                    Arc::clone(&transactional),
                    storage,
                    config.media_max_content_length,
                    Duration::from_secs(config.media_upload_url_expiry_secs),
                    Duration::from_secs(config.media_download_url_expiry_secs),
                )))
            }
            None => {
                tracing::warn!("MEDIA_BUCKET not set; media endpoints are disabled");
                None
            }
        };

        let orchestrator = Arc::new(IngestionOrchestrator::new(
            Arc::clone(&transactional),
            Arc::clone(&analytics),
            event_log,
            Duration::from_millis(config.ingestion_deadline_ms),
        ));

        let state = AppState {
            config: Arc::clone(&config),
            transactional: Arc::clone(&transactional),
            analytics,
            orchestrator,
            media,
        };
        let router = build_router(state);

        let addr = format!("{}:{}", config.host, config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!(addr = %addr, "Server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        transactional.close().await;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}

/// First-run seeding: create the configured organization, project and
/// project API key when they do not exist yet. Lets a fresh deployment
/// ingest without a manual provisioning step.
async fn bootstrap_from_env(
    config: &Config,
    transactional: &TransactionalService,
) -> Result<()> {
    use crate::data::transactional::repositories::{
        api_key as api_key_repo, organization as organization_repo,
    };
    use crate::data::types::{ACCESS_LEVEL_ALL, API_KEY_SCOPE_PROJECT, ApiKeyRow};
    use crate::utils::api_key::{
        display_secret_key, generate_public_key, hash_secret_key, is_valid_secret_key,
    };

    let (Some(org_id), Some(project_id), Some(secret_key)) = (
        &config.init_org_id,
        &config.init_project_id,
        &config.init_secret_key,
    ) else {
        return Ok(());
    };
    if !is_valid_secret_key(secret_key) {
        anyhow::bail!("LUMITRACE_INIT_SECRET_KEY is not a valid secret key");
    }

    let pool = transactional.pool();
    if organization_repo::get_organization(pool, org_id).await?.is_none() {
        organization_repo::create_organization(pool, org_id, org_id).await?;
        tracing::info!(org_id = %org_id, "Seeded organization");
    }
    if organization_repo::get_project(pool, project_id).await?.is_none() {
        organization_repo::create_project(pool, project_id, org_id, project_id).await?;
        tracing::info!(project_id = %project_id, "Seeded project");
    }

    let hash = hash_secret_key(secret_key, &config.api_key_pepper);
    if api_key_repo::find_by_hashed_secret(pool, &hash).await?.is_none() {
        let row = ApiKeyRow {
            id: uuid::Uuid::new_v4().to_string(),
            organization_id: org_id.clone(),
            project_id: Some(project_id.clone()),
            scope: API_KEY_SCOPE_PROJECT.to_string(),
            access_level: ACCESS_LEVEL_ALL.to_string(),
            public_key: generate_public_key(),
            hashed_secret_key: hash,
            display_secret_key: display_secret_key(secret_key),
            note: Some("seeded".to_string()),
            last_used_at: None,
            created_at: chrono::Utc::now(),
        };
        api_key_repo::insert_api_key(pool, &row).await?;
        tracing::info!(project_id = %project_id, "Seeded project API key");
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lumitrace_server=debug"));
    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt().with_env_filter(filter).json().init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    } else {
        tracing::info!("Shutdown signal received");
    }
}
