//! API key repository (PostgreSQL)
//!
//! Secrets are stored only as HMAC hashes; lookups go through the hash.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::ApiKeyRow;

pub async fn insert_api_key(pool: &PgPool, row: &ApiKeyRow) -> Result<(), DataError> {
    sqlx::query(
        r#"
        INSERT INTO api_keys (
            id, organization_id, project_id, scope, access_level, public_key,
            hashed_secret_key, display_secret_key, note, last_used_at, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(&row.id)
    .bind(&row.organization_id)
    .bind(&row.project_id)
    .bind(&row.scope)
    .bind(&row.access_level)
    .bind(&row.public_key)
    .bind(&row.hashed_secret_key)
    .bind(&row.display_secret_key)
    .bind(&row.note)
    .bind(row.last_used_at)
    .bind(row.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_hashed_secret(
    pool: &PgPool,
    hashed_secret_key: &str,
) -> Result<Option<ApiKeyRow>, DataError> {
    let row = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT * FROM api_keys WHERE hashed_secret_key = $1",
    )
    .bind(hashed_secret_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_for_organization(
    pool: &PgPool,
    organization_id: &str,
) -> Result<Vec<ApiKeyRow>, DataError> {
    let rows = sqlx::query_as::<_, ApiKeyRow>(
        "SELECT * FROM api_keys WHERE organization_id = $1 ORDER BY created_at",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_api_key(
    pool: &PgPool,
    organization_id: &str,
    id: &str,
) -> Result<bool, DataError> {
    let result = sqlx::query("DELETE FROM api_keys WHERE organization_id = $1 AND id = $2")
        .bind(organization_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Best-effort last-used stamp; failures are logged, never propagated.
pub async fn touch_last_used(pool: &PgPool, id: &str, at: DateTime<Utc>) {
    if let Err(e) = sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
        .bind(id)
        .bind(at)
        .execute(pool)
        .await
    {
        tracing::warn!(key_id = %id, error = %e, "Failed to update API key last_used_at");
    }
}
