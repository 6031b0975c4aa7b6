//! Prompt registry endpoints

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::data::types::PromptRow;
use crate::domain::prompts::{self, CreatePromptParams, PromptError, PromptType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePromptBody {
    pub name: String,
    pub version: Option<i32>,
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    pub prompt: Value,
    pub config: Option<Value>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub id: String,
    pub name: String,
    pub version: i32,
    #[serde(rename = "type")]
    pub prompt_type: String,
    pub prompt: Value,
    pub config: Option<Value>,
    pub labels: Vec<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
}

impl From<PromptRow> for PromptResponse {
    fn from(row: PromptRow) -> Self {
        let parse_list = |raw: Option<String>| -> Vec<String> {
            raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
        };
        Self {
            id: row.id,
            name: row.name,
            version: row.version,
            prompt_type: row.prompt_type,
            prompt: serde_json::from_str(&row.prompt).unwrap_or(Value::Null),
            config: row.config.and_then(|c| serde_json::from_str(&c).ok()),
            labels: parse_list(row.labels),
            tags: parse_list(row.tags),
            is_active: row.is_active,
        }
    }
}

fn map_prompt_error(e: PromptError) -> ApiError {
    match e {
        PromptError::Validation(message) => ApiError::bad_request("INVALID_PROMPT", message),
        conflict @ PromptError::TypeConflict { .. } => {
            ApiError::bad_request("PROMPT_TYPE_CONFLICT", conflict.to_string())
        }
        PromptError::NotFound => ApiError::not_found("PROMPT_NOT_FOUND", "Prompt not found"),
        PromptError::Storage(e) => ApiError::from_data(e),
    }
}

pub async fn create_prompt(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Json(body): Json<CreatePromptBody>,
) -> Result<(StatusCode, Json<PromptResponse>), ApiError> {
    let params = CreatePromptParams {
        name: body.name,
        version: body.version,
        prompt_type: body.prompt_type,
        prompt: body.prompt,
        config: body.config,
        labels: body.labels,
        tags: body.tags,
        is_active: body.is_active,
        created_by: None,
    };
    let row = prompts::create_prompt(&state.transactional, &auth.project_id, params)
        .await
        .map_err(map_prompt_error)?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

#[derive(Debug, Deserialize)]
pub struct GetPromptQuery {
    pub name: String,
    pub version: Option<i32>,
}

/// Without a version only the active version resolves; with one, any
/// stored version.
pub async fn get_prompt(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Query(query): Query<GetPromptQuery>,
) -> Result<Json<PromptResponse>, ApiError> {
    let row = prompts::get_prompt(
        &state.transactional,
        &auth.project_id,
        &query.name,
        query.version,
    )
    .await
    .map_err(ApiError::from_data)?
    .ok_or_else(|| ApiError::not_found("PROMPT_NOT_FOUND", "Prompt not found"))?;
    Ok(Json(row.into()))
}
