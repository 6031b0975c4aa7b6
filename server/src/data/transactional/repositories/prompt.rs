//! Prompt registry repository (PostgreSQL)
//!
//! Versions are unique per `(project_id, name, version)`. Activation is a
//! per-name flag: marking a version active clears the flag on siblings in
//! the same transaction.

use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::PromptRow;

pub async fn get_prompt_by_id(
    pool: &PgPool,
    project_id: &str,
    id: &str,
) -> Result<Option<PromptRow>, DataError> {
    let row = sqlx::query_as::<_, PromptRow>(
        "SELECT * FROM prompts WHERE project_id = $1 AND id = $2",
    )
    .bind(project_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_prompt_by_version(
    pool: &PgPool,
    project_id: &str,
    name: &str,
    version: i32,
) -> Result<Option<PromptRow>, DataError> {
    let row = sqlx::query_as::<_, PromptRow>(
        "SELECT * FROM prompts WHERE project_id = $1 AND name = $2 AND version = $3",
    )
    .bind(project_id)
    .bind(name)
    .bind(version)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_active_prompt(
    pool: &PgPool,
    project_id: &str,
    name: &str,
) -> Result<Option<PromptRow>, DataError> {
    let row = sqlx::query_as::<_, PromptRow>(
        "SELECT * FROM prompts
         WHERE project_id = $1 AND name = $2 AND is_active = TRUE
         ORDER BY version DESC LIMIT 1",
    )
    .bind(project_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Latest stored version number for a prompt name, if any.
pub async fn max_version(
    pool: &PgPool,
    project_id: &str,
    name: &str,
) -> Result<Option<i32>, DataError> {
    let version: Option<i32> = sqlx::query_scalar(
        "SELECT MAX(version) FROM prompts WHERE project_id = $1 AND name = $2",
    )
    .bind(project_id)
    .bind(name)
    .fetch_one(pool)
    .await?;
    Ok(version)
}

/// The frozen type of a prompt name, from its earliest version.
pub async fn prompt_type_of_name(
    pool: &PgPool,
    project_id: &str,
    name: &str,
) -> Result<Option<String>, DataError> {
    let prompt_type: Option<String> = sqlx::query_scalar(
        "SELECT prompt_type FROM prompts
         WHERE project_id = $1 AND name = $2
         ORDER BY version ASC LIMIT 1",
    )
    .bind(project_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(prompt_type)
}

/// Insert a prompt version; when the row is active, deactivate siblings
/// atomically.
pub async fn insert_prompt(pool: &PgPool, row: &PromptRow) -> Result<(), DataError> {
    let mut tx = pool.begin().await?;

    if row.is_active {
        sqlx::query(
            "UPDATE prompts SET is_active = FALSE, updated_at = $3
             WHERE project_id = $1 AND name = $2 AND is_active = TRUE",
        )
        .bind(&row.project_id)
        .bind(&row.name)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        INSERT INTO prompts (
            id, project_id, name, version, prompt_type, prompt, config,
            labels, tags, is_active, created_by, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (project_id, name, version) DO UPDATE SET
            prompt = EXCLUDED.prompt,
            config = EXCLUDED.config,
            labels = EXCLUDED.labels,
            tags = EXCLUDED.tags,
            is_active = EXCLUDED.is_active,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&row.id)
    .bind(&row.project_id)
    .bind(&row.name)
    .bind(row.version)
    .bind(&row.prompt_type)
    .bind(&row.prompt)
    .bind(&row.config)
    .bind(&row.labels)
    .bind(&row.tags)
    .bind(row.is_active)
    .bind(&row.created_by)
    .bind(row.created_at)
    .bind(row.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
