//! Observation read endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use validator::Validate;

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::{
    ApiError, OrderBy, PaginatedResponse, default_limit, default_page, parse_timestamp_param,
    validate_limit, validate_page,
};
use crate::data::analytics::repositories::observation as analytics_observation;
use crate::data::types::{ListObservationsParams, ObservationRecord};

const OBSERVATION_ORDER_COLUMNS: &[&str] = &["startTime", "endTime", "totalCost", "latency"];

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListObservationsQuery {
    #[serde(default = "default_page")]
    #[validate(custom(function = "validate_page"))]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(custom(function = "validate_limit"))]
    pub limit: u32,
    pub order_by: Option<String>,
    pub trace_id: Option<String>,
    #[serde(rename = "type")]
    pub observation_type: Option<String>,
    pub level: Option<String>,
    pub name: Option<String>,
    pub parent_observation_id: Option<String>,
    pub environment: Option<String>,
    pub from_start_time: Option<String>,
    pub to_start_time: Option<String>,
}

pub async fn list_observations(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Query(query): Query<ListObservationsQuery>,
) -> Result<Json<PaginatedResponse<ObservationRecord>>, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError::bad_request("INVALID_QUERY", e.to_string()))?;

    let order_by = query
        .order_by
        .as_deref()
        .map(|raw| OrderBy::parse(raw, OBSERVATION_ORDER_COLUMNS))
        .transpose()?;

    let environment = query.environment.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    });

    let params = ListObservationsParams {
        project_id: auth.project_id.clone(),
        page: query.page,
        limit: query.limit,
        order_by,
        trace_id: query.trace_id,
        observation_type: query.observation_type,
        level: query.level,
        name: query.name,
        parent_observation_id: query.parent_observation_id,
        environment,
        from_start_time: parse_timestamp_param(&query.from_start_time)?,
        to_start_time: parse_timestamp_param(&query.to_start_time)?,
        filters: Vec::new(),
    };

    let (rows, total) = if state.config.enable_events_table_observations {
        analytics_observation::list_observations_from_events(&state.analytics, &params).await
    } else {
        analytics_observation::list_observations(&state.analytics, &params).await
    }
    .map_err(ApiError::from_data)?;

    Ok(Json(PaginatedResponse::new(
        rows,
        query.page,
        query.limit,
        total,
    )))
}

pub async fn get_observation(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Path(observation_id): Path<String>,
) -> Result<Json<ObservationRecord>, ApiError> {
    let record =
        analytics_observation::get_observation(&state.analytics, &auth.project_id, &observation_id)
            .await
            .map_err(ApiError::from_data)?
            .ok_or_else(|| {
                ApiError::not_found(
                    "OBSERVATION_NOT_FOUND",
                    format!("Observation not found: {}", observation_id),
                )
            })?;
    Ok(Json(record))
}
