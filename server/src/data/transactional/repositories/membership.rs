//! Membership repositories (PostgreSQL)
//!
//! Project memberships are subordinate to organization memberships: the
//! service layer refuses a project membership for a user who has no row in
//! the owning organization.

use chrono::Utc;
use sqlx::PgPool;

use crate::core::constants::{ORG_ROLE_ADMIN, ORG_ROLE_MEMBER, ORG_ROLE_OWNER, ORG_ROLE_VIEWER};
use crate::data::DataError;
use crate::data::types::{OrgMembershipRow, ProjectMembershipRow};

/// Role level for hierarchy checks
fn role_level(role: &str) -> u8 {
    match role {
        ORG_ROLE_VIEWER => 1,
        ORG_ROLE_MEMBER => 2,
        ORG_ROLE_ADMIN => 3,
        ORG_ROLE_OWNER => 4,
        _ => 0,
    }
}

pub fn is_known_role(role: &str) -> bool {
    role_level(role) > 0
}

pub fn has_min_role(user_role: &str, min_role: &str) -> bool {
    role_level(user_role) >= role_level(min_role)
}

pub async fn upsert_org_membership(
    pool: &PgPool,
    organization_id: &str,
    user_id: &str,
    role: &str,
) -> Result<OrgMembershipRow, DataError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO organization_memberships (organization_id, user_id, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (organization_id, user_id) DO UPDATE SET
            role = EXCLUDED.role,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(organization_id)
    .bind(user_id)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(OrgMembershipRow {
        organization_id: organization_id.to_string(),
        user_id: user_id.to_string(),
        role: role.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_org_membership(
    pool: &PgPool,
    organization_id: &str,
    user_id: &str,
) -> Result<Option<OrgMembershipRow>, DataError> {
    let row = sqlx::query_as::<_, OrgMembershipRow>(
        "SELECT * FROM organization_memberships
         WHERE organization_id = $1 AND user_id = $2",
    )
    .bind(organization_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_org_memberships(
    pool: &PgPool,
    organization_id: &str,
) -> Result<Vec<OrgMembershipRow>, DataError> {
    let rows = sqlx::query_as::<_, OrgMembershipRow>(
        "SELECT * FROM organization_memberships
         WHERE organization_id = $1 ORDER BY created_at",
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn upsert_project_membership(
    pool: &PgPool,
    project_id: &str,
    user_id: &str,
    role: &str,
) -> Result<ProjectMembershipRow, DataError> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO project_memberships (project_id, user_id, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (project_id, user_id) DO UPDATE SET
            role = EXCLUDED.role,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(ProjectMembershipRow {
        project_id: project_id.to_string(),
        user_id: user_id.to_string(),
        role: role.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn list_project_memberships(
    pool: &PgPool,
    project_id: &str,
) -> Result<Vec<ProjectMembershipRow>, DataError> {
    let rows = sqlx::query_as::<_, ProjectMembershipRow>(
        "SELECT * FROM project_memberships WHERE project_id = $1 ORDER BY created_at",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Ensure the user row exists (memberships reference users).
pub async fn ensure_user(pool: &PgPool, user_id: &str) -> Result<(), DataError> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO users (id, created_at, updated_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy() {
        assert!(has_min_role(ORG_ROLE_OWNER, ORG_ROLE_ADMIN));
        assert!(has_min_role(ORG_ROLE_ADMIN, ORG_ROLE_ADMIN));
        assert!(!has_min_role(ORG_ROLE_MEMBER, ORG_ROLE_ADMIN));
        assert!(!has_min_role("INTRUDER", ORG_ROLE_VIEWER));
    }

    #[test]
    fn known_roles() {
        for role in [ORG_ROLE_OWNER, ORG_ROLE_ADMIN, ORG_ROLE_MEMBER, ORG_ROLE_VIEWER] {
            assert!(is_known_role(role));
        }
        assert!(!is_known_role("owner"));
    }
}
