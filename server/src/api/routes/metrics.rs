//! Declarative metrics endpoint
//!
//! `GET /api/public/metrics?query={json}` compiles a measure/dimension
//! request against a view catalog and executes the resulting rollup query.
//! All identifier validation happens at build time, before any SQL runs.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::api::auth::ProjectScoped;
use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::data::analytics::repositories::query as query_repo;
use crate::data::query::{
    AggregateQueryBuilder, Aggregation, Catalog, Filter, MeasureSpec, QueryBuildError,
};

#[derive(Debug, Deserialize)]
struct MeasureRequest {
    measure: String,
    #[serde(rename = "agg")]
    aggregation: String,
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// "observations", "traces" or "scores"
    view: String,
    measures: Vec<MeasureRequest>,
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    filters: Vec<Filter>,
}

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    /// URL-encoded JSON query
    pub query: String,
}

fn catalog_for_view(view: &str) -> Result<Catalog, ApiError> {
    match view {
        "observations" => Ok(Catalog::events()),
        "traces" => Ok(Catalog::traces()),
        "scores" => Ok(Catalog::scores()),
        other => Err(ApiError::bad_request(
            "INVALID_VIEW",
            format!("Unknown view: {}", other),
        )),
    }
}

fn map_build_error(e: QueryBuildError) -> ApiError {
    ApiError::bad_request("INVALID_QUERY", e.to_string())
}

pub async fn query_metrics(
    State(state): State<AppState>,
    auth: ProjectScoped,
    Query(params): Query<MetricsParams>,
) -> Result<Json<Value>, ApiError> {
    let request: MetricsQuery = serde_json::from_str(&params.query)
        .map_err(|e| ApiError::bad_request("INVALID_QUERY_JSON", e.to_string()))?;

    let catalog = catalog_for_view(&request.view)?;
    let measures: Vec<MeasureSpec> = request
        .measures
        .iter()
        .map(|m| {
            let aggregation = Aggregation::parse(&m.aggregation).ok_or_else(|| {
                ApiError::bad_request(
                    "INVALID_AGGREGATION",
                    format!("Unknown aggregation: {}", m.aggregation),
                )
            })?;
            Ok(match &m.alias {
                Some(alias) => MeasureSpec::aliased(&m.measure, aggregation, alias),
                None => MeasureSpec::new(&m.measure, aggregation),
            })
        })
        .collect::<Result<_, ApiError>>()?;
    let dimensions: Vec<&str> = request.dimensions.iter().map(String::as_str).collect();

    let compiled = AggregateQueryBuilder::new(&auth.project_id, &catalog, &measures, &dimensions)
        .filters(&request.filters)
        .build()
        .map_err(map_build_error)?;

    let rows = query_repo::run_compiled(&state.analytics, compiled)
        .await
        .map_err(ApiError::from_data)?;
    Ok(Json(json!({ "data": rows })))
}
