//! Media repository (PostgreSQL)
//!
//! Media rows are content-addressed: uniqueness is by
//! `(project_id, sha256_hash, content_type, content_length)` so identical
//! payloads share one stored object.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::MediaRow;

pub async fn get_media(
    pool: &PgPool,
    project_id: &str,
    id: &str,
) -> Result<Option<MediaRow>, DataError> {
    let row =
        sqlx::query_as::<_, MediaRow>("SELECT * FROM media WHERE project_id = $1 AND id = $2")
            .bind(project_id)
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row)
}

/// Look up an existing asset by content identity.
pub async fn find_by_content(
    pool: &PgPool,
    project_id: &str,
    sha256_hash: &str,
    content_type: &str,
    content_length: i64,
) -> Result<Option<MediaRow>, DataError> {
    let row = sqlx::query_as::<_, MediaRow>(
        "SELECT * FROM media
         WHERE project_id = $1 AND sha256_hash = $2
           AND content_type = $3 AND content_length = $4",
    )
    .bind(project_id)
    .bind(sha256_hash)
    .bind(content_type)
    .bind(content_length)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Create or refresh the row for a content identity. A retried request
/// with corrected parameters overwrites the previous error state.
pub async fn upsert_media(pool: &PgPool, row: &MediaRow) -> Result<(), DataError> {
    sqlx::query(
        r#"
        INSERT INTO media (
            id, project_id, sha256_hash, content_type, content_length,
            bucket_name, bucket_path, upload_http_status, upload_http_error,
            uploaded_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (project_id, sha256_hash, content_type, content_length) DO UPDATE SET
            bucket_name = EXCLUDED.bucket_name,
            bucket_path = EXCLUDED.bucket_path,
            upload_http_status = EXCLUDED.upload_http_status,
            upload_http_error = EXCLUDED.upload_http_error,
            uploaded_at = EXCLUDED.uploaded_at,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.project_id)
    .bind(&row.sha256_hash)
    .bind(&row.content_type)
    .bind(row.content_length)
    .bind(&row.bucket_name)
    .bind(&row.bucket_path)
    .bind(row.upload_http_status)
    .bind(&row.upload_http_error)
    .bind(row.uploaded_at)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record the client's upload report. Returns false when the row is gone.
pub async fn record_upload_result(
    pool: &PgPool,
    project_id: &str,
    id: &str,
    uploaded_at: DateTime<Utc>,
    http_status: i32,
    http_error: Option<&str>,
) -> Result<bool, DataError> {
    let result = sqlx::query(
        "UPDATE media SET
            upload_http_status = $3,
            upload_http_error = $4,
            uploaded_at = $5,
            updated_at = $6
         WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .bind(http_status)
    .bind(http_error)
    .bind(uploaded_at)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Associate an asset with a trace field (idempotent).
pub async fn attach_to_trace(
    pool: &PgPool,
    project_id: &str,
    trace_id: &str,
    media_id: &str,
    field: &str,
) -> Result<(), DataError> {
    sqlx::query(
        "INSERT INTO trace_media (project_id, trace_id, media_id, field, created_at)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (project_id, trace_id, media_id, field) DO NOTHING",
    )
    .bind(project_id)
    .bind(trace_id)
    .bind(media_id)
    .bind(field)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Associate an asset with an observation field (idempotent).
pub async fn attach_to_observation(
    pool: &PgPool,
    project_id: &str,
    trace_id: &str,
    observation_id: &str,
    media_id: &str,
    field: &str,
) -> Result<(), DataError> {
    sqlx::query(
        "INSERT INTO observation_media
            (project_id, trace_id, observation_id, media_id, field, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (project_id, observation_id, media_id, field) DO NOTHING",
    )
    .bind(project_id)
    .bind(trace_id)
    .bind(observation_id)
    .bind(media_id)
    .bind(field)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
