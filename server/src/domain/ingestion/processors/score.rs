//! Score processor
//!
//! Scores are point-in-time: the row timestamp is the write time, not the
//! event time. Referenced traces and observations must belong to the
//! scope's project.

use chrono::Utc;

use crate::data::analytics::repositories::score as analytics_score;
use crate::data::transactional::repositories::{
    observation as observation_repo, score as score_repo, trace as trace_repo,
};
use crate::data::types::{ScoreRow, encode_json_column};
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::events::{ScoreCommand, ScoreSource};

use super::super::error::IngestionError;

/// Apply one score command; writes the row to both stores.
pub async fn process_score(
    transactional: &TransactionalService,
    analytics: &AnalyticsService,
    project_id: &str,
    command: &ScoreCommand,
) -> Result<(), IngestionError> {
    let pool = transactional.pool();
    let body = &command.body;

    // Scope check: a referenced trace/observation outside the project (or
    // absent from it) denies the write.
    if let Some(trace_id) = &body.trace_id {
        let trace = trace_repo::get_trace(pool, project_id, trace_id).await?;
        if trace.is_none() {
            return Err(IngestionError::Forbidden(format!(
                "Trace {} does not belong to the authorized project",
                trace_id
            )));
        }
    }
    if let Some(observation_id) = &body.observation_id {
        let observation =
            observation_repo::get_observation(pool, project_id, observation_id).await?;
        if observation.is_none() {
            return Err(IngestionError::Forbidden(format!(
                "Observation {} does not belong to the authorized project",
                observation_id
            )));
        }
    }

    let now = Utc::now();
    let row = ScoreRow {
        id: command.score_id.clone(),
        project_id: project_id.to_string(),
        name: body.name.clone(),
        source: ScoreSource::Api.as_str().to_string(),
        data_type: command.data_type.as_str().to_string(),
        value: body.value,
        string_value: body.string_value.clone(),
        comment: body.comment.clone(),
        metadata: encode_json_column(body.metadata.as_ref()),
        config_id: body.config_id.clone(),
        author_user_id: None,
        queue_id: None,
        trace_id: body.trace_id.clone(),
        session_id: body.session_id.clone(),
        dataset_run_id: body.dataset_run_id.clone(),
        observation_id: body.observation_id.clone(),
        environment: command.environment.clone(),
        // Scores track write time, not event time.
        timestamp: now,
        created_at: now,
        updated_at: now,
    };

    score_repo::upsert_score(pool, &row).await?;
    analytics_score::insert_score(analytics, &row).await?;
    Ok(())
}
