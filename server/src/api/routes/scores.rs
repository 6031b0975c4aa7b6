//! Score read/delete endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use validator::Validate;

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::{
    ApiError, OrderBy, PaginatedResponse, default_limit, default_page, parse_timestamp_param,
    validate_limit, validate_page,
};
use crate::data::analytics::repositories::score as analytics_score;
use crate::data::transactional::repositories::score as score_repo;
use crate::data::types::{ListScoresParams, ScoreRecord, ScoreValueOperator};

const SCORE_ORDER_COLUMNS: &[&str] = &["timestamp", "name", "value", "dataType", "source"];

fn split_csv(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListScoresQuery {
    #[serde(default = "default_page")]
    #[validate(custom(function = "validate_page"))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
    pub order_by: Option<String>,
    pub name: Option<String>,
    pub source: Option<String>,
    pub data_type: Option<String>,
    pub trace_id: Option<String>,
    pub session_id: Option<String>,
    pub observation_id: Option<String>,
    pub queue_id: Option<String>,
    pub config_id: Option<String>,
    pub user_id: Option<String>,
    pub score_ids: Option<String>,
    pub trace_tags: Option<String>,
    pub environment: Option<String>,
    /// Numeric comparison on the score value, e.g. `operator=>=&value=0.5`
    pub operator: Option<String>,
    pub value: Option<f64>,
    pub from_timestamp: Option<String>,
    pub to_timestamp: Option<String>,
}

pub async fn list_scores(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Query(query): Query<ListScoresQuery>,
) -> Result<Json<PaginatedResponse<ScoreRecord>>, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError::bad_request("INVALID_QUERY", e.to_string()))?;

    let order_by = query
        .order_by
        .as_deref()
        .map(|raw| OrderBy::parse(raw, SCORE_ORDER_COLUMNS))
        .transpose()?;

    let value = match (&query.operator, query.value) {
        (Some(operator), Some(value)) => {
            let operator = ScoreValueOperator::parse(operator).ok_or_else(|| {
                ApiError::bad_request(
                    "INVALID_OPERATOR",
                    format!("Unsupported operator: {}", operator),
                )
            })?;
            Some((operator, value))
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(ApiError::bad_request(
                "INVALID_OPERATOR",
                "operator and value must be provided together",
            ));
        }
        (None, None) => None,
    };

    let params = ListScoresParams {
        project_id: auth.project_id.clone(),
        page: query.page,
        limit: query.limit,
        order_by,
        name: query.name,
        source: query.source,
        data_type: query.data_type,
        trace_id: query.trace_id,
        session_id: query.session_id,
        observation_id: query.observation_id,
        queue_id: query.queue_id,
        config_id: query.config_id,
        author_user_id: query.user_id,
        score_ids: split_csv(&query.score_ids),
        trace_tags: split_csv(&query.trace_tags),
        environment: split_csv(&query.environment),
        value,
        from_timestamp: parse_timestamp_param(&query.from_timestamp)?,
        to_timestamp: parse_timestamp_param(&query.to_timestamp)?,
    };

    let (rows, total) = analytics_score::list_scores(&state.analytics, &params)
        .await
        .map_err(ApiError::from_data)?;
    Ok(Json(PaginatedResponse::new(
        rows,
        query.page,
        query.limit,
        total,
    )))
}

pub async fn get_score(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(score_id): Path<String>,
) -> Result<Json<ScoreRecord>, ApiError> {
    let record = analytics_score::get_score(&state.analytics, &auth.project_id, &score_id)
        .await
        .map_err(ApiError::from_data)?
        .ok_or_else(|| {
            ApiError::not_found("SCORE_NOT_FOUND", format!("Score not found: {}", score_id))
        })?;
    Ok(Json(record))
}

pub async fn delete_score(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(score_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let removed = score_repo::delete_score(state.transactional.pool(), &auth.project_id, &score_id)
        .await
        .map_err(ApiError::from_data)?;
    if !removed {
        return Err(ApiError::not_found(
            "SCORE_NOT_FOUND",
            format!("Score not found: {}", score_id),
        ));
    }
    analytics_score::delete_score(&state.analytics, &auth.project_id, &score_id)
        .await
        .map_err(ApiError::from_data)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": score_id }))))
}
