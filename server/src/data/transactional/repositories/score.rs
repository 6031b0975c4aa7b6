//! Score repository (PostgreSQL)

use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::ScoreRow;

pub async fn get_score(
    pool: &PgPool,
    project_id: &str,
    id: &str,
) -> Result<Option<ScoreRow>, DataError> {
    let row = sqlx::query_as::<_, ScoreRow>(
        "SELECT * FROM scores WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Upsert keyed `(project_id, id)`; a re-send with a different reference
/// overwrites the stored reference (document-level last write wins).
pub async fn upsert_score(pool: &PgPool, row: &ScoreRow) -> Result<(), DataError> {
    sqlx::query(
        r#"
        INSERT INTO scores (
            id, project_id, name, source, data_type, value, string_value,
            comment, metadata, config_id, author_user_id, queue_id, trace_id,
            session_id, dataset_run_id, observation_id, environment,
            timestamp, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                $15, $16, $17, $18, $19, $20)
        ON CONFLICT (project_id, id) DO UPDATE SET
            name = EXCLUDED.name,
            source = EXCLUDED.source,
            data_type = EXCLUDED.data_type,
            value = EXCLUDED.value,
            string_value = EXCLUDED.string_value,
            comment = EXCLUDED.comment,
            metadata = EXCLUDED.metadata,
            config_id = EXCLUDED.config_id,
            author_user_id = EXCLUDED.author_user_id,
            queue_id = EXCLUDED.queue_id,
            trace_id = EXCLUDED.trace_id,
            session_id = EXCLUDED.session_id,
            dataset_run_id = EXCLUDED.dataset_run_id,
            observation_id = EXCLUDED.observation_id,
            environment = EXCLUDED.environment,
            timestamp = EXCLUDED.timestamp,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.project_id)
    .bind(&row.name)
    .bind(&row.source)
    .bind(&row.data_type)
    .bind(row.value)
    .bind(&row.string_value)
    .bind(&row.comment)
    .bind(&row.metadata)
    .bind(&row.config_id)
    .bind(&row.author_user_id)
    .bind(&row.queue_id)
    .bind(&row.trace_id)
    .bind(&row.session_id)
    .bind(&row.dataset_run_id)
    .bind(&row.observation_id)
    .bind(&row.environment)
    .bind(row.timestamp)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_score(pool: &PgPool, project_id: &str, id: &str) -> Result<bool, DataError> {
    let result = sqlx::query("DELETE FROM scores WHERE project_id = $1 AND id = $2")
        .bind(project_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
