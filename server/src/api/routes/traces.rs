//! Trace read/delete endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use validator::Validate;

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::{
    ApiError, MAX_DELETE_BATCH, OrderBy, PaginatedResponse, default_limit, default_page,
    parse_timestamp_param, validate_limit, validate_page,
};
use crate::data::analytics::repositories::trace as analytics_trace;
use crate::data::query::Filter;
use crate::data::transactional::repositories::trace as trace_repo;
use crate::data::types::{ListTracesParams, TraceRecord};
use crate::domain::traces::{AgentGraphEntry, TraceDetail, get_agent_graph_data, get_trace_by_id};

const TRACE_ORDER_COLUMNS: &[&str] = &[
    "timestamp",
    "name",
    "userId",
    "sessionId",
    "environment",
    "latency",
    "totalCost",
];

/// Comma-separated or repeated list parameter
fn split_csv(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    })
}

fn parse_filter_json(raw: &Option<String>) -> Result<Vec<Filter>, ApiError> {
    match raw {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| ApiError::bad_request("INVALID_FILTER_JSON", e.to_string())),
        None => Ok(Vec::new()),
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListTracesQuery {
    #[serde(default = "default_page")]
    #[validate(custom(function = "validate_page"))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
    pub order_by: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub name: Option<String>,
    pub environment: Option<String>,
    pub tags: Option<String>,
    pub from_timestamp: Option<String>,
    pub to_timestamp: Option<String>,
    pub filters: Option<String>,
}

pub async fn list_traces(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Query(query): Query<ListTracesQuery>,
) -> Result<Json<PaginatedResponse<TraceRecord>>, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError::bad_request("INVALID_QUERY", e.to_string()))?;

    let order_by = query
        .order_by
        .as_deref()
        .map(|raw| OrderBy::parse(raw, TRACE_ORDER_COLUMNS))
        .transpose()?;

    let params = ListTracesParams {
        project_id: auth.project_id.clone(),
        page: query.page,
        limit: query.limit,
        order_by,
        user_id: query.user_id,
        session_id: query.session_id,
        release: query.release,
        version: query.version,
        name: query.name,
        environment: split_csv(&query.environment),
        tags: split_csv(&query.tags),
        from_timestamp: parse_timestamp_param(&query.from_timestamp)?,
        to_timestamp: parse_timestamp_param(&query.to_timestamp)?,
        filters: parse_filter_json(&query.filters)?,
    };

    let (rows, total) = analytics_trace::list_traces(&state.analytics, &params)
        .await
        .map_err(ApiError::from_data)?;
    Ok(Json(PaginatedResponse::new(
        rows,
        query.page,
        query.limit,
        total,
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDetailQuery {
    /// Partition hint for the analytical-store read
    pub timestamp: Option<String>,
}

pub async fn get_trace(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(trace_id): Path<String>,
    Query(query): Query<TraceDetailQuery>,
) -> Result<Json<TraceDetail>, ApiError> {
    let timestamp_hint = parse_timestamp_param(&query.timestamp)?;
    let detail = get_trace_by_id(&state.analytics, &auth.project_id, &trace_id, timestamp_hint)
        .await
        .map_err(ApiError::from_data)?
        .ok_or_else(|| {
            ApiError::not_found("TRACE_NOT_FOUND", format!("Trace not found: {}", trace_id))
        })?;
    Ok(Json(detail))
}

pub async fn get_agent_graph(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(trace_id): Path<String>,
) -> Result<Json<Vec<AgentGraphEntry>>, ApiError> {
    let observations = crate::data::analytics::repositories::observation::get_observations_for_trace(
        &state.analytics,
        &auth.project_id,
        &trace_id,
    )
    .await
    .map_err(ApiError::from_data)?;
    Ok(Json(get_agent_graph_data(&observations)))
}

pub async fn delete_trace(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(trace_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let removed = trace_repo::delete_trace(
        state.transactional.pool(),
        &auth.project_id,
        &trace_id,
    )
    .await
    .map_err(ApiError::from_data)?;
    if !removed {
        return Err(ApiError::not_found(
            "TRACE_NOT_FOUND",
            format!("Trace not found: {}", trace_id),
        ));
    }
    analytics_trace::delete_traces(&state.analytics, &auth.project_id, &[trace_id.clone()])
        .await
        .map_err(ApiError::from_data)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": trace_id }))))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTracesBody {
    pub trace_ids: Vec<String>,
}

pub async fn delete_traces_batch(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Json(body): Json<DeleteTracesBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.trace_ids.is_empty() {
        return Err(ApiError::bad_request("EMPTY_BATCH", "traceIds cannot be empty"));
    }
    if body.trace_ids.len() > MAX_DELETE_BATCH {
        return Err(ApiError::bad_request(
            "BATCH_TOO_LARGE",
            format!("Cannot delete more than {} traces at once", MAX_DELETE_BATCH),
        ));
    }
    let deleted = trace_repo::delete_traces(
        state.transactional.pool(),
        &auth.project_id,
        &body.trace_ids,
    )
    .await
    .map_err(ApiError::from_data)?;
    analytics_trace::delete_traces(&state.analytics, &auth.project_id, &body.trace_ids)
        .await
        .map_err(ApiError::from_data)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "deleted": deleted }))))
}
