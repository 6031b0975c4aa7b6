//! Observation repository (PostgreSQL)

use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::ObservationRow;

pub async fn get_observation(
    pool: &PgPool,
    project_id: &str,
    id: &str,
) -> Result<Option<ObservationRow>, DataError> {
    let row = sqlx::query_as::<_, ObservationRow>(
        "SELECT * FROM observations WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Write the full merged row; the processor owns merge semantics.
pub async fn upsert_observation(pool: &PgPool, row: &ObservationRow) -> Result<(), DataError> {
    sqlx::query(
        r#"
        INSERT INTO observations (
            id, project_id, trace_id, parent_observation_id, observation_type,
            name, level, status_message, start_time, end_time,
            completion_start_time, input, output, metadata, model,
            model_parameters, usage_details, cost_details, prompt_tokens,
            completion_tokens, total_tokens, unit, version, environment,
            prompt_id, event_ts, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28)
        ON CONFLICT (project_id, id) DO UPDATE SET
            trace_id = EXCLUDED.trace_id,
            parent_observation_id = EXCLUDED.parent_observation_id,
            observation_type = EXCLUDED.observation_type,
            name = EXCLUDED.name,
            level = EXCLUDED.level,
            status_message = EXCLUDED.status_message,
            start_time = EXCLUDED.start_time,
            end_time = EXCLUDED.end_time,
            completion_start_time = EXCLUDED.completion_start_time,
            input = EXCLUDED.input,
            output = EXCLUDED.output,
            metadata = EXCLUDED.metadata,
            model = EXCLUDED.model,
            model_parameters = EXCLUDED.model_parameters,
            usage_details = EXCLUDED.usage_details,
            cost_details = EXCLUDED.cost_details,
            prompt_tokens = EXCLUDED.prompt_tokens,
            completion_tokens = EXCLUDED.completion_tokens,
            total_tokens = EXCLUDED.total_tokens,
            unit = EXCLUDED.unit,
            version = EXCLUDED.version,
            environment = EXCLUDED.environment,
            prompt_id = EXCLUDED.prompt_id,
            event_ts = EXCLUDED.event_ts,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.project_id)
    .bind(&row.trace_id)
    .bind(&row.parent_observation_id)
    .bind(&row.observation_type)
    .bind(&row.name)
    .bind(&row.level)
    .bind(&row.status_message)
    .bind(row.start_time)
    .bind(row.end_time)
    .bind(row.completion_start_time)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.metadata)
    .bind(&row.model)
    .bind(&row.model_parameters)
    .bind(&row.usage_details)
    .bind(&row.cost_details)
    .bind(row.prompt_tokens)
    .bind(row.completion_tokens)
    .bind(row.total_tokens)
    .bind(&row.unit)
    .bind(&row.version)
    .bind(&row.environment)
    .bind(&row.prompt_id)
    .bind(row.event_ts)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
