//! ClickHouse observation repository
//!
//! Inserts merged observation state into `observations` and `events`, and
//! serves the observation read paths. The events-table read path compiles a
//! declarative select instead of hand-written SQL and can be toggled on via
//! configuration.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::data::DataError;
use crate::data::analytics::AnalyticsService;
use crate::data::query::{
    Aggregation, AggregateQueryBuilder, Catalog, MeasureSpec, SelectQueryBuilder, SortDirection,
    SqlParams,
};
use crate::data::types::{ListObservationsParams, ObservationRecord, ObservationRow, parse_json_column};
use crate::utils::clickhouse::{chrono_to_time, micros_to_chrono};

use super::query::run_compiled;

/// Split stored cost details into the explicit total and the sum of
/// components. An explicit `total` always wins downstream.
pub fn cost_components(cost_details: &BTreeMap<String, f64>) -> (Option<f64>, f64) {
    let explicit_total = cost_details.get("total").copied();
    let component_sum = cost_details
        .iter()
        .filter(|(key, _)| key.as_str() != "total")
        .map(|(_, v)| v)
        .sum();
    (explicit_total, component_sum)
}

fn parse_details(raw: Option<&str>) -> BTreeMap<String, f64> {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

#[derive(Row, Serialize)]
struct ObservationInsert {
    project_id: String,
    id: String,
    trace_id: String,
    parent_observation_id: String,
    #[serde(rename = "type")]
    observation_type: String,
    name: String,
    level: String,
    status_message: String,
    environment: String,
    model: String,
    model_parameters: String,
    input: String,
    output: String,
    metadata: String,
    usage_details: String,
    cost_details: String,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    explicit_total_cost: Option<f64>,
    component_cost_sum: f64,
    unit: String,
    version: String,
    prompt_id: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    start_time: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros::option")]
    end_time: Option<OffsetDateTime>,
    #[serde(with = "clickhouse::serde::time::datetime64::micros::option")]
    completion_start_time: Option<OffsetDateTime>,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    event_ts: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    created_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    updated_at: OffsetDateTime,
}

#[derive(Row, Serialize)]
struct ObservationEventInsert {
    project_id: String,
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    #[serde(rename = "type")]
    event_type: String,
    name: String,
    level: String,
    environment: String,
    user_id: String,
    session_id: String,
    model: String,
    tags: Vec<String>,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    start_time: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros::option")]
    end_time: Option<OffsetDateTime>,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    event_ts: OffsetDateTime,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    total_cost: f64,
    latency_ms: Option<i64>,
    input: String,
    output: String,
    metadata: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    updated_at: OffsetDateTime,
}

/// Insert the merged observation state into `observations` and `events`.
pub async fn insert_observation(
    service: &AnalyticsService,
    row: &ObservationRow,
) -> Result<(), DataError> {
    let cost_details = parse_details(row.cost_details.as_deref());
    let (explicit_total_cost, component_cost_sum) = cost_components(&cost_details);
    let latency_ms = row
        .end_time
        .map(|end| (end - row.start_time).num_milliseconds());

    let mut insert = service.client().insert::<ObservationInsert>("observations").await?;
    insert
        .write(&ObservationInsert {
            project_id: row.project_id.clone(),
            id: row.id.clone(),
            trace_id: row.trace_id.clone().unwrap_or_default(),
            parent_observation_id: row.parent_observation_id.clone().unwrap_or_default(),
            observation_type: row.observation_type.clone(),
            name: row.name.clone().unwrap_or_default(),
            level: row.level.clone(),
            status_message: row.status_message.clone().unwrap_or_default(),
            environment: row.environment.clone(),
            model: row.model.clone().unwrap_or_default(),
            model_parameters: row.model_parameters.clone().unwrap_or_default(),
            input: row.input.clone().unwrap_or_default(),
            output: row.output.clone().unwrap_or_default(),
            metadata: row.metadata.clone().unwrap_or_default(),
            usage_details: row.usage_details.clone().unwrap_or_default(),
            cost_details: row.cost_details.clone().unwrap_or_default(),
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            explicit_total_cost,
            component_cost_sum,
            unit: row.unit.clone().unwrap_or_default(),
            version: row.version.clone().unwrap_or_default(),
            prompt_id: row.prompt_id.clone().unwrap_or_default(),
            start_time: chrono_to_time(row.start_time),
            end_time: row.end_time.map(chrono_to_time),
            completion_start_time: row.completion_start_time.map(chrono_to_time),
            event_ts: chrono_to_time(row.event_ts),
            created_at: chrono_to_time(row.created_at),
            updated_at: chrono_to_time(row.updated_at),
        })
        .await?;
    insert.end().await?;

    let total_cost = explicit_total_cost.unwrap_or(component_cost_sum);
    let mut events = service.client().insert::<ObservationEventInsert>("events").await?;
    events
        .write(&ObservationEventInsert {
            project_id: row.project_id.clone(),
            trace_id: row.trace_id.clone().unwrap_or_default(),
            span_id: row.id.clone(),
            parent_span_id: row
                .parent_observation_id
                .clone()
                .unwrap_or_else(|| row.trace_id.clone().unwrap_or_default()),
            event_type: row.observation_type.clone(),
            name: row.name.clone().unwrap_or_default(),
            level: row.level.clone(),
            environment: row.environment.clone(),
            user_id: String::new(),
            session_id: String::new(),
            model: row.model.clone().unwrap_or_default(),
            tags: Vec::new(),
            start_time: chrono_to_time(row.start_time),
            end_time: row.end_time.map(chrono_to_time),
            event_ts: chrono_to_time(row.event_ts),
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            total_cost,
            latency_ms,
            input: row.input.clone().unwrap_or_default(),
            output: row.output.clone().unwrap_or_default(),
            metadata: row.metadata.clone().unwrap_or_default(),
            updated_at: chrono_to_time(row.updated_at),
        })
        .await?;
    events.end().await?;

    Ok(())
}

// ============================================================================
// Read path (observations_view)
// ============================================================================

#[derive(Row, Deserialize)]
struct ChObservationRow {
    id: String,
    trace_id: String,
    parent_observation_id: String,
    observation_type: String,
    name: String,
    level: String,
    status_message: String,
    environment: String,
    model: String,
    model_parameters: String,
    input: String,
    output: String,
    metadata: String,
    usage_details: String,
    cost_details: String,
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
    unit: String,
    version: String,
    prompt_id: String,
    start_time: i64,
    end_time: Option<i64>,
    completion_start_time: Option<i64>,
    total_cost: Option<f64>,
    latency_ms: Option<i64>,
    time_to_first_token_ms: Option<i64>,
}

fn none_if_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl From<ChObservationRow> for ObservationRecord {
    fn from(row: ChObservationRow) -> Self {
        Self {
            id: row.id,
            trace_id: none_if_empty(row.trace_id),
            parent_observation_id: none_if_empty(row.parent_observation_id),
            observation_type: row.observation_type,
            name: none_if_empty(row.name),
            level: row.level,
            status_message: none_if_empty(row.status_message),
            start_time: micros_to_chrono(row.start_time),
            end_time: row.end_time.map(micros_to_chrono),
            completion_start_time: row.completion_start_time.map(micros_to_chrono),
            input: parse_json_column(none_if_empty(row.input).as_deref()),
            output: parse_json_column(none_if_empty(row.output).as_deref()),
            metadata: parse_json_column(none_if_empty(row.metadata).as_deref()),
            model: none_if_empty(row.model),
            model_parameters: parse_json_column(none_if_empty(row.model_parameters).as_deref()),
            usage_details: parse_details(none_if_empty(row.usage_details).as_deref()),
            cost_details: parse_details(none_if_empty(row.cost_details).as_deref()),
            prompt_tokens: row.prompt_tokens,
            completion_tokens: row.completion_tokens,
            total_tokens: row.total_tokens,
            unit: none_if_empty(row.unit),
            version: none_if_empty(row.version),
            environment: row.environment,
            prompt_id: none_if_empty(row.prompt_id),
            latency_ms: row.latency_ms,
            time_to_first_token_ms: row.time_to_first_token_ms,
            total_cost: row.total_cost,
        }
    }
}

const SELECT_COLUMNS: &str = "id, trace_id, parent_observation_id, type AS observation_type, \
     name, level, status_message, environment, model, model_parameters, input, output, metadata, \
     usage_details, cost_details, prompt_tokens, completion_tokens, total_tokens, unit, version, \
     prompt_id, toUnixTimestamp64Micro(start_time) AS start_time, \
     if(end_time IS NULL, NULL, toUnixTimestamp64Micro(assumeNotNull(end_time))) AS end_time, \
     if(completion_start_time IS NULL, NULL, \
        toUnixTimestamp64Micro(assumeNotNull(completion_start_time))) AS completion_start_time, \
     total_cost, latency_ms, time_to_first_token_ms";

fn push_conditions(
    params: &ListObservationsParams,
    conditions: &mut Vec<String>,
    sql_params: &mut SqlParams,
) {
    if let Some(trace_id) = &params.trace_id {
        conditions.push("trace_id = ?".into());
        sql_params.push_str(trace_id.clone());
    }
    if let Some(observation_type) = &params.observation_type {
        conditions.push("type = ?".into());
        sql_params.push_str(observation_type.clone());
    }
    if let Some(level) = &params.level {
        conditions.push("level = ?".into());
        sql_params.push_str(level.clone());
    }
    if let Some(name) = &params.name {
        conditions.push("name = ?".into());
        sql_params.push_str(name.clone());
    }
    if let Some(parent) = &params.parent_observation_id {
        conditions.push("parent_observation_id = ?".into());
        sql_params.push_str(parent.clone());
    }
    if let Some(environments) = &params.environment
        && !environments.is_empty()
    {
        let placeholders: Vec<&str> = environments.iter().map(|_| "?").collect();
        conditions.push(format!("environment IN ({})", placeholders.join(", ")));
        for env in environments {
            sql_params.push_str(env.clone());
        }
    }
    if let Some(from) = &params.from_start_time {
        conditions.push("start_time >= fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(from.timestamp_micros());
    }
    if let Some(to) = &params.to_start_time {
        conditions.push("start_time < fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(to.timestamp_micros());
    }
}

fn map_order_column(column: &str) -> &str {
    match column {
        "startTime" => "start_time",
        "endTime" => "end_time",
        "totalCost" => "total_cost",
        "latency" => "latency_ms",
        other => other,
    }
}

/// List observations from the materialized view.
pub async fn list_observations(
    service: &AnalyticsService,
    params: &ListObservationsParams,
) -> Result<(Vec<ObservationRecord>, u64), DataError> {
    let mut conditions: Vec<String> = vec!["project_id = ?".into()];
    let mut sql_params = SqlParams::default();
    sql_params.push_str(params.project_id.clone());
    push_conditions(params, &mut conditions, &mut sql_params);

    let order = params
        .order_by
        .as_ref()
        .map(|o| o.to_sql_mapped(map_order_column))
        .unwrap_or_else(|| "start_time DESC".to_string());

    let offset = (params.page.max(1) as u64 - 1) * params.limit as u64;
    let sql = format!(
        "SELECT {} FROM observations_view WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        SELECT_COLUMNS,
        conditions.join(" AND "),
        order,
        params.limit,
        offset
    );
    let rows: Vec<ChObservationRow> = sql_params
        .bind_to(service.client().query(&sql))
        .fetch_all()
        .await?;

    let count_sql = format!(
        "SELECT count() FROM observations_view WHERE {}",
        conditions.join(" AND ")
    );
    let total: u64 = sql_params
        .bind_to(service.client().query(&count_sql))
        .fetch_one()
        .await?;

    Ok((rows.into_iter().map(ObservationRecord::from).collect(), total))
}

pub async fn get_observation(
    service: &AnalyticsService,
    project_id: &str,
    observation_id: &str,
) -> Result<Option<ObservationRecord>, DataError> {
    let sql = format!(
        "SELECT {} FROM observations_view WHERE project_id = ? AND id = ? LIMIT 1",
        SELECT_COLUMNS
    );
    let row: Option<ChObservationRow> = service
        .client()
        .query(&sql)
        .bind(project_id)
        .bind(observation_id)
        .fetch_optional()
        .await?;
    Ok(row.map(ObservationRecord::from))
}

/// All observations of one trace, ordered by start time.
pub async fn get_observations_for_trace(
    service: &AnalyticsService,
    project_id: &str,
    trace_id: &str,
) -> Result<Vec<ObservationRecord>, DataError> {
    let sql = format!(
        "SELECT {} FROM observations_view WHERE project_id = ? AND trace_id = ? \
         ORDER BY start_time ASC",
        SELECT_COLUMNS
    );
    let rows: Vec<ChObservationRow> = service
        .client()
        .query(&sql)
        .bind(project_id)
        .bind(trace_id)
        .fetch_all()
        .await?;
    Ok(rows.into_iter().map(ObservationRecord::from).collect())
}

// ============================================================================
// Events-table read path (declarative select over the events catalog)
// ============================================================================

const EVENT_FIELDS: &[&str] = &[
    "id",
    "traceId",
    "parentObservationId",
    "type",
    "name",
    "level",
    "environment",
    "model",
    "startTime",
    "endTime",
    "promptTokens",
    "completionTokens",
    "totalTokens",
    "totalCost",
    "latencyMs",
];

/// Parse a ClickHouse JSON datetime (`2025-01-01 12:00:00.123456`).
fn parse_ch_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn record_from_event_row(row: &Value) -> ObservationRecord {
    let text = |key: &str| -> Option<String> {
        row.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let int = |key: &str| row.get(key).and_then(Value::as_i64);
    ObservationRecord {
        id: text("id").unwrap_or_default(),
        trace_id: text("traceId"),
        parent_observation_id: text("parentObservationId"),
        observation_type: text("type").unwrap_or_default(),
        name: text("name"),
        level: text("level").unwrap_or_else(|| "DEFAULT".to_string()),
        status_message: None,
        start_time: row
            .get("startTime")
            .and_then(parse_ch_datetime)
            .unwrap_or(DateTime::UNIX_EPOCH),
        end_time: row.get("endTime").and_then(parse_ch_datetime),
        completion_start_time: None,
        input: None,
        output: None,
        metadata: None,
        model: text("model"),
        model_parameters: None,
        usage_details: BTreeMap::new(),
        cost_details: BTreeMap::new(),
        prompt_tokens: int("promptTokens").unwrap_or(0),
        completion_tokens: int("completionTokens").unwrap_or(0),
        total_tokens: int("totalTokens").unwrap_or(0),
        unit: None,
        version: None,
        environment: text("environment").unwrap_or_else(|| "default".to_string()),
        prompt_id: None,
        latency_ms: int("latencyMs"),
        time_to_first_token_ms: None,
        total_cost: row.get("totalCost").and_then(Value::as_f64),
    }
}

/// List observations from the raw `events` table via the query engine.
///
/// Trace rows (`parent_span_id = ''`, empty type) are excluded with a
/// catalog filter; derived payload columns are not materialized here.
pub async fn list_observations_from_events(
    service: &AnalyticsService,
    params: &ListObservationsParams,
) -> Result<(Vec<ObservationRecord>, u64), DataError> {
    use crate::data::query::filters::{Filter, StringOp};

    let catalog = Catalog::events();
    let mut filters: Vec<Filter> = vec![Filter::String {
        column: "type".into(),
        operator: StringOp::Ne,
        value: String::new(),
    }];
    if let Some(trace_id) = &params.trace_id {
        filters.push(Filter::String {
            column: "traceId".into(),
            operator: StringOp::Eq,
            value: trace_id.clone(),
        });
    }
    if let Some(observation_type) = &params.observation_type {
        filters.push(Filter::String {
            column: "type".into(),
            operator: StringOp::Eq,
            value: observation_type.clone(),
        });
    }
    if let Some(level) = &params.level {
        filters.push(Filter::String {
            column: "level".into(),
            operator: StringOp::Eq,
            value: level.clone(),
        });
    }
    if let Some(name) = &params.name {
        filters.push(Filter::String {
            column: "name".into(),
            operator: StringOp::Eq,
            value: name.clone(),
        });
    }
    if let Some(environments) = &params.environment
        && !environments.is_empty()
    {
        filters.push(Filter::StringOptions {
            column: "environment".into(),
            operator: crate::data::query::filters::OptionsOp::AnyOf,
            value: environments.clone(),
        });
    }
    if let Some(from) = params.from_start_time {
        filters.push(Filter::Datetime {
            column: "startTime".into(),
            operator: crate::data::query::filters::DatetimeOp::Gte,
            value: from,
        });
    }
    if let Some(to) = params.to_start_time {
        filters.push(Filter::Datetime {
            column: "startTime".into(),
            operator: crate::data::query::filters::DatetimeOp::Lt,
            value: to,
        });
    }
    filters.extend(params.filters.iter().cloned());

    let select = SelectQueryBuilder::new(&params.project_id, &catalog, EVENT_FIELDS)
        .filters(&filters)
        .order_by("startTime", SortDirection::Desc)
        .paginate(params.page, params.limit)
        .build()
        .map_err(|e| DataError::Config(format!("Query build failed: {}", e)))?;
    let rows = run_compiled(service, select).await?;
    let records = rows.iter().map(record_from_event_row).collect();

    let count_measures = [MeasureSpec::new("count", Aggregation::Count)];
    let count_query =
        AggregateQueryBuilder::new(&params.project_id, &catalog, &count_measures, &[])
            .filters(&filters)
            .build()
            .map_err(|e| DataError::Config(format!("Query build failed: {}", e)))?;
    let count_rows = run_compiled(service, count_query).await?;
    let total = count_rows
        .first()
        .and_then(|row| row.get("count_count"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok((records, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cost_components_split() {
        let mut details = BTreeMap::new();
        details.insert("input".to_string(), 0.03);
        details.insert("output".to_string(), 0.05);
        assert_eq!(cost_components(&details), (None, 0.08));

        details.insert("total".to_string(), 0.10);
        let (explicit, components) = cost_components(&details);
        assert_eq!(explicit, Some(0.10));
        assert!((components - 0.08).abs() < 1e-9);
    }

    #[test]
    fn ch_datetime_parses() {
        let parsed = parse_ch_datetime(&json!("2025-01-01 12:30:00.123456")).unwrap();
        assert_eq!(parsed.timestamp_micros(), 1_735_734_600_123_456);
        assert!(parse_ch_datetime(&json!(42)).is_none());
    }

    #[test]
    fn event_row_maps_to_record() {
        let row = json!({
            "id": "o1",
            "traceId": "t1",
            "parentObservationId": "",
            "type": "GENERATION",
            "name": "llm-call",
            "level": "DEFAULT",
            "environment": "prod",
            "model": "gpt-4",
            "startTime": "2025-01-01 00:00:00.000000",
            "endTime": null,
            "promptTokens": 5,
            "completionTokens": 7,
            "totalTokens": 12,
            "totalCost": 0.01,
            "latencyMs": null
        });
        let record = record_from_event_row(&row);
        assert_eq!(record.id, "o1");
        assert_eq!(record.parent_observation_id, None);
        assert_eq!(record.observation_type, "GENERATION");
        assert_eq!(record.total_tokens, 12);
        assert_eq!(record.total_cost, Some(0.01));
    }
}
