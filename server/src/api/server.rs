//! Router construction and shared state

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::Config;
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::ingestion::IngestionOrchestrator;
use crate::domain::media::MediaService;

use super::routes;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transactional: Arc<TransactionalService>,
    pub analytics: Arc<AnalyticsService>,
    pub orchestrator: Arc<IngestionOrchestrator>,
    /// Absent when no media bucket is configured
    pub media: Option<Arc<MediaService>>,
}

/// Build the public API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health))
        .route("/api/public/ingestion", post(routes::ingestion::ingest))
        .route("/api/public/traces", get(routes::traces::list_traces))
        .route(
            "/api/public/traces",
            delete(routes::traces::delete_traces_batch),
        )
        .route("/api/public/traces/{trace_id}", get(routes::traces::get_trace))
        .route(
            "/api/public/traces/{trace_id}",
            delete(routes::traces::delete_trace),
        )
        .route(
            "/api/public/traces/{trace_id}/agent-graph",
            get(routes::traces::get_agent_graph),
        )
        .route(
            "/api/public/observations",
            get(routes::observations::list_observations),
        )
        .route(
            "/api/public/observations/{observation_id}",
            get(routes::observations::get_observation),
        )
        .route("/api/public/scores", get(routes::scores::list_scores))
        .route("/api/public/scores/{score_id}", get(routes::scores::get_score))
        .route(
            "/api/public/scores/{score_id}",
            delete(routes::scores::delete_score),
        )
        .route("/api/public/prompts", post(routes::prompts::create_prompt))
        .route("/api/public/prompts", get(routes::prompts::get_prompt))
        .route("/api/public/metrics", get(routes::metrics::query_metrics))
        .route("/api/public/media", post(routes::media::get_upload_url))
        .route(
            "/api/public/media/{media_id}",
            patch(routes::media::report_upload),
        )
        .route(
            "/api/public/media/{media_id}",
            get(routes::media::get_media),
        )
        .route(
            "/api/public/organizations/memberships",
            get(routes::memberships::list_org_memberships)
                .put(routes::memberships::upsert_org_membership),
        )
        .route(
            "/api/public/projects/{project_id}/memberships",
            get(routes::memberships::list_project_memberships)
                .put(routes::memberships::upsert_project_membership),
        )
        .route(
            "/api/public/organizations/api-keys",
            get(routes::api_keys::list_api_keys).post(routes::api_keys::create_api_key),
        )
        .route(
            "/api/public/organizations/api-keys/{key_id}",
            delete(routes::api_keys::delete_api_key),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
