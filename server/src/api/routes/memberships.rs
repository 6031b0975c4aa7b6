//! Membership admin endpoints
//!
//! All membership endpoints require an organization-scoped key; project
//! keys get 403 from the extractor. Project memberships require an
//! existing organization membership (404 otherwise).

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;

use crate::api::auth::OrgScoped;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::data::transactional::repositories::{
    membership as membership_repo, organization as organization_repo,
};
use crate::data::types::{OrgMembershipRow, ProjectMembershipRow};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertMembershipBody {
    pub user_id: String,
    pub role: String,
}

fn validate_role(role: &str) -> Result<(), ApiError> {
    if !membership_repo::is_known_role(role) {
        return Err(ApiError::bad_request(
            "INVALID_ROLE",
            format!("Unknown role: {}", role),
        ));
    }
    Ok(())
}

pub async fn list_org_memberships(
    State(state): State<AppState>,
    auth: OrgScoped,
) -> Result<Json<Vec<OrgMembershipRow>>, ApiError> {
    let rows = membership_repo::list_org_memberships(
        state.transactional.pool(),
        &auth.scope.org_id,
    )
    .await
    .map_err(ApiError::from_data)?;
    Ok(Json(rows))
}

pub async fn upsert_org_membership(
    State(state): State<AppState>,
    auth: OrgScoped,
    Json(body): Json<UpsertMembershipBody>,
) -> Result<Json<OrgMembershipRow>, ApiError> {
    validate_role(&body.role)?;
    let pool = state.transactional.pool();
    membership_repo::ensure_user(pool, &body.user_id)
        .await
        .map_err(ApiError::from_data)?;
    let row = membership_repo::upsert_org_membership(
        pool,
        &auth.scope.org_id,
        &body.user_id,
        &body.role,
    )
    .await
    .map_err(ApiError::from_data)?;
    Ok(Json(row))
}

pub async fn list_project_memberships(
    State(state): State<AppState>,
    auth: OrgScoped,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ProjectMembershipRow>>, ApiError> {
    let pool = state.transactional.pool();
    ensure_project_in_org(&state, &auth, &project_id).await?;
    let rows = membership_repo::list_project_memberships(pool, &project_id)
        .await
        .map_err(ApiError::from_data)?;
    Ok(Json(rows))
}

/// Project memberships are subordinate to organization memberships: a user
/// without one gets 404, not an implicit grant.
pub async fn upsert_project_membership(
    State(state): State<AppState>,
    auth: OrgScoped,
    Path(project_id): Path<String>,
    Json(body): Json<UpsertMembershipBody>,
) -> Result<Json<ProjectMembershipRow>, ApiError> {
    validate_role(&body.role)?;
    ensure_project_in_org(&state, &auth, &project_id).await?;

    let pool = state.transactional.pool();
    let org_membership =
        membership_repo::get_org_membership(pool, &auth.scope.org_id, &body.user_id)
            .await
            .map_err(ApiError::from_data)?;
    if org_membership.is_none() {
        return Err(ApiError::not_found(
            "ORG_MEMBERSHIP_NOT_FOUND",
            "User has no membership in the project's organization",
        ));
    }

    let row = membership_repo::upsert_project_membership(
        pool,
        &project_id,
        &body.user_id,
        &body.role,
    )
    .await
    .map_err(ApiError::from_data)?;
    Ok(Json(row))
}

async fn ensure_project_in_org(
    state: &AppState,
    auth: &OrgScoped,
    project_id: &str,
) -> Result<(), ApiError> {
    let project = organization_repo::get_project(state.transactional.pool(), project_id)
        .await
        .map_err(ApiError::from_data)?
        .ok_or_else(|| {
            ApiError::not_found("PROJECT_NOT_FOUND", format!("Project not found: {}", project_id))
        })?;
    if project.organization_id != auth.scope.org_id {
        return Err(ApiError::forbidden(
            "Project does not belong to the key's organization",
        ));
    }
    Ok(())
}
