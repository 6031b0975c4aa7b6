//! API key resolution
//!
//! Parses the Authorization header, hashes the secret under the server
//! pepper and resolves the stored key to an `AccessScope`. Invalid keys
//! yield an undifferentiated 401 so probing reveals nothing.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use chrono::Utc;

use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::data::transactional::repositories::api_key as api_key_repo;
use crate::utils::api_key::{extract_credentials, hash_secret_key};

use super::scope::AccessScope;

/// Resolve the Authorization header to a scope.
pub async fn resolve_scope(
    state: &AppState,
    auth_header: Option<&str>,
) -> Result<AccessScope, ApiError> {
    let header = auth_header.ok_or_else(|| {
        ApiError::unauthorized("Authorization header required")
    })?;
    let (public_key, secret_key) = extract_credentials(header)
        .ok_or_else(|| ApiError::unauthorized("Invalid authorization header format"))?;

    let hash = hash_secret_key(&secret_key, &state.config.api_key_pepper);
    let row = api_key_repo::find_by_hashed_secret(state.transactional.pool(), &hash)
        .await
        .map_err(ApiError::from_data)?
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

    // Basic credentials carry the public key; when present it must match.
    if let Some(public) = public_key
        && public != row.public_key
    {
        return Err(ApiError::unauthorized("Invalid API key"));
    }

    api_key_repo::touch_last_used(state.transactional.pool(), &row.id, Utc::now()).await;
    Ok(AccessScope::from_key(&row))
}

/// Extractor: any authenticated scope.
pub struct Authenticated(pub AccessScope);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let scope = resolve_scope(state, header).await?;
        Ok(Self(scope))
    }
}

/// Extractor: a project-scoped key; yields the project id with the scope.
pub struct ProjectScoped {
    pub scope: AccessScope,
    pub project_id: String,
}

impl FromRequestParts<AppState> for ProjectScoped {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(scope) = Authenticated::from_request_parts(parts, state).await?;
        let project_id = scope
            .require_project()
            .ok_or_else(|| {
                ApiError::forbidden("This endpoint requires a project-scoped API key")
            })?
            .to_string();
        Ok(Self { scope, project_id })
    }
}

/// Extractor: an organization-scoped key (admin endpoints). Project keys
/// are rejected with 403.
pub struct OrgScoped {
    pub scope: AccessScope,
}

impl FromRequestParts<AppState> for OrgScoped {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Authenticated(scope) = Authenticated::from_request_parts(parts, state).await?;
        if !scope.is_organization_scoped() {
            return Err(ApiError::forbidden(
                "This endpoint requires an organization-scoped API key",
            ));
        }
        Ok(Self { scope })
    }
}
