//! Ingestion endpoint
//!
//! `POST /api/public/ingestion` accepts the batch envelope and always
//! answers 207 Multi-Status once the envelope parses; envelope problems are
//! the only whole-request 400s.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::Value;

use crate::api::auth::{AccessLevel, ProjectScoped};
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::domain::events::IngestionBatch;
use crate::domain::ingestion::IngestionOutcome;

pub async fn ingest(
    State(state): State<AppState>,
    auth: ProjectScoped,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Result<(StatusCode, Json<IngestionOutcome>), ApiError> {
    let Json(raw) = body.map_err(|e| {
        ApiError::bad_request("INVALID_ENVELOPE", format!("Malformed request body: {}", e))
    })?;
    let envelope: IngestionBatch = serde_json::from_value(raw).map_err(|e| {
        ApiError::bad_request("INVALID_ENVELOPE", format!("Malformed envelope: {}", e))
    })?;

    if envelope.batch.len() > state.config.max_batch_size {
        return Err(ApiError::bad_request(
            "BATCH_TOO_LARGE",
            format!(
                "Batch exceeds the maximum of {} events",
                state.config.max_batch_size
            ),
        ));
    }

    let scores_only = match auth.scope.access_level {
        AccessLevel::All => false,
        AccessLevel::ScoresOnly => true,
        AccessLevel::None => {
            return Err(ApiError::forbidden("API key has no ingestion access"));
        }
    };

    let outcome = state
        .orchestrator
        .process_batch(&auth.project_id, envelope.batch, scores_only)
        .await;

    Ok((StatusCode::MULTI_STATUS, Json(outcome)))
}
