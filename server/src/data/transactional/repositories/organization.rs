//! Organization and project repositories (PostgreSQL)

use chrono::Utc;
use sqlx::PgPool;

use crate::data::DataError;
use crate::data::types::{OrganizationRow, ProjectRow};

pub async fn create_organization(
    pool: &PgPool,
    id: &str,
    name: &str,
) -> Result<OrganizationRow, DataError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO organizations (id, name, created_at, updated_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(OrganizationRow {
        id: id.to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_organization(
    pool: &PgPool,
    id: &str,
) -> Result<Option<OrganizationRow>, DataError> {
    let row = sqlx::query_as::<_, OrganizationRow>("SELECT * FROM organizations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn create_project(
    pool: &PgPool,
    id: &str,
    organization_id: &str,
    name: &str,
) -> Result<ProjectRow, DataError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO projects (id, organization_id, name, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id)
    .bind(organization_id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(ProjectRow {
        id: id.to_string(),
        organization_id: organization_id.to_string(),
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_project(pool: &PgPool, id: &str) -> Result<Option<ProjectRow>, DataError> {
    let row = sqlx::query_as::<_, ProjectRow>("SELECT * FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn list_projects_for_org(
    pool: &PgPool,
    organization_id: &str,
) -> Result<Vec<ProjectRow>, DataError> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        "SELECT * FROM projects WHERE organization_id = $1 ORDER BY created_at",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete a project; entity rows and media associations cascade.
pub async fn delete_project(pool: &PgPool, id: &str) -> Result<bool, DataError> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
