//! API key admin endpoints
//!
//! Key creation returns the secret exactly once; storage keeps only the
//! HMAC hash and a display fragment.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::auth::OrgScoped;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::data::transactional::repositories::{
    api_key as api_key_repo, organization as organization_repo,
};
use crate::data::types::{
    ACCESS_LEVEL_ALL, ACCESS_LEVEL_SCORES_ONLY, API_KEY_SCOPE_ORGANIZATION,
    API_KEY_SCOPE_PROJECT, ApiKeyRow,
};
use crate::utils::api_key::{
    display_secret_key, generate_public_key, generate_secret_key, hash_secret_key,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyBody {
    /// Omit for an organization-scoped key
    pub project_id: Option<String>,
    #[serde(default)]
    pub scores_only: bool,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKey {
    pub id: String,
    pub public_key: String,
    /// Returned exactly once; never retrievable again
    pub secret_key: String,
    pub scope: String,
    pub access_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeySummary {
    pub id: String,
    pub public_key: String,
    pub display_secret_key: String,
    pub scope: String,
    pub access_level: String,
    pub project_id: Option<String>,
    pub note: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub last_used_at: Option<chrono::DateTime<Utc>>,
}

pub async fn create_api_key(
    State(state): State<AppState>,
    auth: OrgScoped,
    Json(body): Json<CreateApiKeyBody>,
) -> Result<(StatusCode, Json<CreatedApiKey>), ApiError> {
    let pool = state.transactional.pool();

    let (scope, project_id) = match &body.project_id {
        Some(project_id) => {
            let project = organization_repo::get_project(pool, project_id)
                .await
                .map_err(ApiError::from_data)?
                .ok_or_else(|| {
                    ApiError::not_found(
                        "PROJECT_NOT_FOUND",
                        format!("Project not found: {}", project_id),
                    )
                })?;
            if project.organization_id != auth.scope.org_id {
                return Err(ApiError::forbidden(
                    "Project does not belong to the key's organization",
                ));
            }
            (API_KEY_SCOPE_PROJECT, Some(project_id.clone()))
        }
        None => (API_KEY_SCOPE_ORGANIZATION, None),
    };

    let access_level = if body.scores_only {
        if project_id.is_none() {
            return Err(ApiError::bad_request(
                "INVALID_ACCESS_LEVEL",
                "scores-only applies to project-scoped keys",
            ));
        }
        ACCESS_LEVEL_SCORES_ONLY
    } else {
        ACCESS_LEVEL_ALL
    };

    let secret_key = generate_secret_key();
    let row = ApiKeyRow {
        id: Uuid::new_v4().to_string(),
        organization_id: auth.scope.org_id.clone(),
        project_id,
        scope: scope.to_string(),
        access_level: access_level.to_string(),
        public_key: generate_public_key(),
        hashed_secret_key: hash_secret_key(&secret_key, &state.config.api_key_pepper),
        display_secret_key: display_secret_key(&secret_key),
        note: body.note,
        last_used_at: None,
        created_at: Utc::now(),
    };
    api_key_repo::insert_api_key(pool, &row)
        .await
        .map_err(ApiError::from_data)?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKey {
            id: row.id,
            public_key: row.public_key,
            secret_key,
            scope: row.scope,
            access_level: row.access_level,
        }),
    ))
}

pub async fn list_api_keys(
    State(state): State<AppState>,
    auth: OrgScoped,
) -> Result<Json<Vec<ApiKeySummary>>, ApiError> {
    let rows = api_key_repo::list_for_organization(
        state.transactional.pool(),
        &auth.scope.org_id,
    )
    .await
    .map_err(ApiError::from_data)?;
    let summaries = rows
        .into_iter()
        .map(|row| ApiKeySummary {
            id: row.id,
            public_key: row.public_key,
            display_secret_key: row.display_secret_key,
            scope: row.scope,
            access_level: row.access_level,
            project_id: row.project_id,
            note: row.note,
            created_at: row.created_at,
            last_used_at: row.last_used_at,
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    auth: OrgScoped,
    Path(key_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = api_key_repo::delete_api_key(
        state.transactional.pool(),
        &auth.scope.org_id,
        &key_id,
    )
    .await
    .map_err(ApiError::from_data)?;
    if !removed {
        return Err(ApiError::not_found(
            "API_KEY_NOT_FOUND",
            format!("API key not found: {}", key_id),
        ));
    }
    Ok(StatusCode::NO_CONTENT)
}
