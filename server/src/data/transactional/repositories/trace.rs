//! Trace repository (PostgreSQL)

use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::{SessionRow, TraceRow};

pub async fn get_trace(
    pool: &PgPool,
    project_id: &str,
    id: &str,
) -> Result<Option<TraceRow>, DataError> {
    let row = sqlx::query_as::<_, TraceRow>(
        "SELECT * FROM traces WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Write the full merged row; the processor owns merge semantics.
pub async fn upsert_trace(pool: &PgPool, row: &TraceRow) -> Result<(), DataError> {
    sqlx::query(
        r#"
        INSERT INTO traces (
            id, project_id, name, user_id, session_id, input, output, metadata,
            release, version, tags, public, bookmarked, environment,
            timestamp, event_ts, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (project_id, id) DO UPDATE SET
            name = EXCLUDED.name,
            user_id = EXCLUDED.user_id,
            session_id = EXCLUDED.session_id,
            input = EXCLUDED.input,
            output = EXCLUDED.output,
            metadata = EXCLUDED.metadata,
            release = EXCLUDED.release,
            version = EXCLUDED.version,
            tags = EXCLUDED.tags,
            public = EXCLUDED.public,
            bookmarked = EXCLUDED.bookmarked,
            environment = EXCLUDED.environment,
            timestamp = EXCLUDED.timestamp,
            event_ts = EXCLUDED.event_ts,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.project_id)
    .bind(&row.name)
    .bind(&row.user_id)
    .bind(&row.session_id)
    .bind(&row.input)
    .bind(&row.output)
    .bind(&row.metadata)
    .bind(&row.release)
    .bind(&row.version)
    .bind(&row.tags)
    .bind(row.public)
    .bind(row.bookmarked)
    .bind(&row.environment)
    .bind(row.timestamp)
    .bind(row.event_ts)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete a trace together with its observations and trace-level scores.
pub async fn delete_trace(pool: &PgPool, project_id: &str, id: &str) -> Result<bool, DataError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM observations WHERE project_id = $1 AND trace_id = $2")
        .bind(project_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM scores WHERE project_id = $1 AND trace_id = $2")
        .bind(project_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM traces WHERE project_id = $1 AND id = $2")
        .bind(project_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_traces(
    pool: &PgPool,
    project_id: &str,
    ids: &[String],
) -> Result<u64, DataError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM observations WHERE project_id = $1 AND trace_id = ANY($2)")
        .bind(project_id)
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM scores WHERE project_id = $1 AND trace_id = ANY($2)")
        .bind(project_id)
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM traces WHERE project_id = $1 AND id = ANY($2)")
        .bind(project_id)
        .bind(ids)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected())
}

/// Upsert a session reference; existing rows are left untouched.
pub async fn upsert_session(
    pool: &PgPool,
    project_id: &str,
    session_id: &str,
) -> Result<(), DataError> {
    sqlx::query(
        "INSERT INTO trace_sessions (id, project_id, created_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (project_id, id) DO NOTHING",
    )
    .bind(session_id)
    .bind(project_id)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(
    pool: &PgPool,
    project_id: &str,
    session_id: &str,
) -> Result<Option<SessionRow>, DataError> {
    let row = sqlx::query_as::<_, SessionRow>(
        "SELECT * FROM trace_sessions WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(session_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
