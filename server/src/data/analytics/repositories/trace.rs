//! ClickHouse trace repository
//!
//! Inserts merged trace state and serves the trace list/detail read paths.
//! Every trace also lands in the `events` table as a row with
//! `parent_span_id = ''` so the query engine can roll traces up.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::data::DataError;
use crate::data::analytics::AnalyticsService;
use crate::data::query::{Catalog, SqlParams};
use crate::data::types::{ListTracesParams, TraceRecord, TraceRow, parse_json_column};
use crate::utils::clickhouse::{chrono_to_time, micros_to_chrono};

#[derive(Row, Serialize)]
struct TraceInsert {
    project_id: String,
    id: String,
    name: String,
    user_id: String,
    session_id: String,
    release: String,
    version: String,
    environment: String,
    tags: Vec<String>,
    public: bool,
    bookmarked: bool,
    input: String,
    output: String,
    metadata: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    event_ts: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    created_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    updated_at: OffsetDateTime,
}

#[derive(Row, Serialize)]
struct TraceEventInsert {
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

fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}

/// Insert the merged trace state into `traces` and `events`.
pub async fn insert_trace(service: &AnalyticsService, row: &TraceRow) -> Result<(), DataError> {
    let tags = parse_tags(row.tags.as_deref());

    let mut insert = service.client().insert::<TraceInsert>("traces").await?;
    insert
        .write(&TraceInsert {
            project_id: row.project_id.clone(),
            id: row.id.clone(),
            name: row.name.clone().unwrap_or_default(),
            user_id: row.user_id.clone().unwrap_or_default(),
            session_id: row.session_id.clone().unwrap_or_default(),
            release: row.release.clone().unwrap_or_default(),
            version: row.version.clone().unwrap_or_default(),
            environment: row.environment.clone(),
            tags: tags.clone(),
            public: row.public,
            bookmarked: row.bookmarked,
            input: row.input.clone().unwrap_or_default(),
            output: row.output.clone().unwrap_or_default(),
            metadata: row.metadata.clone().unwrap_or_default(),
            timestamp: chrono_to_time(row.timestamp),
            event_ts: chrono_to_time(row.event_ts),
            created_at: chrono_to_time(row.created_at),
            updated_at: chrono_to_time(row.updated_at),
        })
        .await?;
    insert.end().await?;

    let mut events = service.client().insert::<TraceEventInsert>("events").await?;
    events
        .write(&TraceEventInsert {
            project_id: row.project_id.clone(),
            trace_id: row.id.clone(),
            span_id: row.id.clone(),
            parent_span_id: String::new(),
            event_type: String::new(),
            name: row.name.clone().unwrap_or_default(),
            level: "DEFAULT".to_string(),
            environment: row.environment.clone(),
            user_id: row.user_id.clone().unwrap_or_default(),
            session_id: row.session_id.clone().unwrap_or_default(),
            model: String::new(),
            tags,
            start_time: chrono_to_time(row.timestamp),
            end_time: None,
            event_ts: chrono_to_time(row.event_ts),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            total_cost: 0.0,
            latency_ms: None,
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
// Read path
// ============================================================================

#[derive(Row, Deserialize)]
struct ChTraceRow {
    id: String,
    name: String,
    user_id: String,
    session_id: String,
    release: String,
    version: String,
    environment: String,
    tags: Vec<String>,
    public: bool,
    bookmarked: bool,
    timestamp: i64,
    input: String,
    output: String,
    metadata: String,
    observation_count: u64,
    total_cost: f64,
    latency_ms: Option<i64>,
}

fn none_if_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl From<ChTraceRow> for TraceRecord {
    fn from(row: ChTraceRow) -> Self {
        Self {
            id: row.id,
            name: none_if_empty(row.name),
            user_id: none_if_empty(row.user_id),
            session_id: none_if_empty(row.session_id),
            release: none_if_empty(row.release),
            version: none_if_empty(row.version),
            environment: row.environment,
            tags: row.tags,
            public: row.public,
            bookmarked: row.bookmarked,
            timestamp: micros_to_chrono(row.timestamp),
            input: parse_json_column(none_if_empty(row.input).as_deref()),
            output: parse_json_column(none_if_empty(row.output).as_deref()),
            metadata: parse_json_column(none_if_empty(row.metadata).as_deref()),
            observation_count: row.observation_count,
            total_cost: row.total_cost,
            latency_ms: row.latency_ms,
        }
    }
}

const SELECT_COLUMNS: &str = "t.id, t.name, t.user_id, t.session_id, t.release, t.version, \
     t.environment, t.tags, t.public, t.bookmarked, \
     toUnixTimestamp64Micro(t.timestamp) AS timestamp, t.input, t.output, t.metadata, \
     o.observation_count, o.total_cost, o.latency_ms";

const OBSERVATION_ROLLUP: &str = "SELECT trace_id, count() AS observation_count, \
     sum(total_cost) AS total_cost, \
     dateDiff('millisecond', min(start_time), max(coalesce(end_time, start_time))) AS latency_ms \
     FROM observations_view WHERE project_id = ? GROUP BY trace_id";

/// Append simple per-parameter conditions shared by list and count queries.
fn push_conditions(
    params: &ListTracesParams,
    conditions: &mut Vec<String>,
    sql_params: &mut SqlParams,
) -> Result<(), DataError> {
    if let Some(user_id) = &params.user_id {
        conditions.push("t.user_id = ?".into());
        sql_params.push_str(user_id.clone());
    }
    if let Some(session_id) = &params.session_id {
        conditions.push("t.session_id = ?".into());
        sql_params.push_str(session_id.clone());
    }
    if let Some(release) = &params.release {
        conditions.push("t.release = ?".into());
        sql_params.push_str(release.clone());
    }
    if let Some(version) = &params.version {
        conditions.push("t.version = ?".into());
        sql_params.push_str(version.clone());
    }
    if let Some(name) = &params.name {
        conditions.push("t.name = ?".into());
        sql_params.push_str(name.clone());
    }
    if let Some(environments) = &params.environment
        && !environments.is_empty()
    {
        let placeholders: Vec<&str> = environments.iter().map(|_| "?").collect();
        conditions.push(format!("t.environment IN ({})", placeholders.join(", ")));
        for env in environments {
            sql_params.push_str(env.clone());
        }
    }
    if let Some(tags) = &params.tags {
        for tag in tags {
            conditions.push("has(t.tags, ?)".into());
            sql_params.push_str(tag.clone());
        }
    }
    if let Some(from) = &params.from_timestamp {
        conditions.push("t.timestamp >= fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(from.timestamp_micros());
    }
    if let Some(to) = &params.to_timestamp {
        conditions.push("t.timestamp < fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(to.timestamp_micros());
    }

    let catalog = Catalog::traces();
    for filter in &params.filters {
        let field = catalog.field(filter.column()).ok_or_else(|| {
            DataError::Config(format!("Unvalidated filter column: {}", filter.column()))
        })?;
        let column_sql = format!("t.{}", field.column);
        let fragment = filter.to_sql(
            &column_sql,
            field.kind == crate::data::query::FieldKind::StringArray,
            sql_params,
        );
        conditions.push(fragment);
    }
    Ok(())
}

/// List traces with derived aggregates; returns the page plus total count.
pub async fn list_traces(
    service: &AnalyticsService,
    params: &ListTracesParams,
) -> Result<(Vec<TraceRecord>, u64), DataError> {
    let mut conditions: Vec<String> = vec!["t.project_id = ?".into()];
    let mut sql_params = SqlParams::default();
    sql_params.push_str(params.project_id.clone());
    push_conditions(params, &mut conditions, &mut sql_params)?;

    let order = params
        .order_by
        .as_ref()
        .map(|o| o.to_sql_mapped(map_order_column))
        .unwrap_or_else(|| "timestamp DESC".to_string());

    let offset = (params.page.max(1) as u64 - 1) * params.limit as u64;
    let sql = format!(
        "SELECT {} FROM traces t FINAL LEFT JOIN ({}) o ON t.id = o.trace_id \
         WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        SELECT_COLUMNS,
        OBSERVATION_ROLLUP,
        conditions.join(" AND "),
        order,
        params.limit,
        offset
    );

    // Rollup subquery binds project first, then the outer conditions.
    let mut all_params = SqlParams::default();
    all_params.push_str(params.project_id.clone());
    all_params.values.extend(sql_params.values.iter().cloned());

    let rows: Vec<ChTraceRow> = all_params
        .bind_to(service.client().query(&sql))
        .fetch_all()
        .await?;

    let count_sql = format!(
        "SELECT count() FROM traces t FINAL WHERE {}",
        conditions.join(" AND ")
    );
    let total: u64 = sql_params
        .bind_to(service.client().query(&count_sql))
        .fetch_one()
        .await?;

    Ok((rows.into_iter().map(TraceRecord::from).collect(), total))
}

fn map_order_column(column: &str) -> &str {
    match column {
        "timestamp" => "t.timestamp",
        "name" => "t.name",
        "userId" => "t.user_id",
        "sessionId" => "t.session_id",
        "environment" => "t.environment",
        "latency" => "o.latency_ms",
        "totalCost" => "o.total_cost",
        other => other,
    }
}

/// Fetch one trace; the timestamp hint narrows the scan to its partition.
pub async fn get_trace(
    service: &AnalyticsService,
    project_id: &str,
    trace_id: &str,
    timestamp_hint: Option<DateTime<Utc>>,
) -> Result<Option<TraceRecord>, DataError> {
    let mut conditions = vec!["t.project_id = ?".to_string(), "t.id = ?".to_string()];
    let mut sql_params = SqlParams::default();
    sql_params.push_str(project_id);
    sql_params.push_str(trace_id);
    if let Some(hint) = timestamp_hint {
        conditions.push("toDate(t.timestamp) = toDate(fromUnixTimestamp64Micro(?))".into());
        sql_params.push_i64(hint.timestamp_micros());
    }

    let sql = format!(
        "SELECT {} FROM traces t FINAL LEFT JOIN ({}) o ON t.id = o.trace_id WHERE {} LIMIT 1",
        SELECT_COLUMNS,
        OBSERVATION_ROLLUP,
        conditions.join(" AND ")
    );

    let mut all_params = SqlParams::default();
    all_params.push_str(project_id);
    all_params.values.extend(sql_params.values.iter().cloned());

    let row: Option<ChTraceRow> = all_params
        .bind_to(service.client().query(&sql))
        .fetch_optional()
        .await?;
    Ok(row.map(TraceRecord::from))
}

/// Remove traces (and their events) from the analytical store.
pub async fn delete_traces(
    service: &AnalyticsService,
    project_id: &str,
    trace_ids: &[String],
) -> Result<(), DataError> {
    if trace_ids.is_empty() {
        return Ok(());
    }
    let placeholders: Vec<&str> = trace_ids.iter().map(|_| "?").collect();
    for (table, column) in [
        ("traces", "id"),
        ("observations", "trace_id"),
        ("scores", "trace_id"),
        ("events", "trace_id"),
    ] {
        let sql = format!(
            "DELETE FROM {} WHERE project_id = ? AND {} IN ({})",
            table,
            column,
            placeholders.join(", ")
        );
        let mut query = service.client().query(&sql).bind(project_id);
        for id in trace_ids {
            query = query.bind(id);
        }
        query.execute().await?;
    }
    Ok(())
}
