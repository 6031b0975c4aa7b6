//! ClickHouse score repository

use clickhouse::Row;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::data::DataError;
use crate::data::analytics::AnalyticsService;
use crate::data::query::SqlParams;
use crate::data::types::{ListScoresParams, ScoreRecord, ScoreRow, parse_json_column};
use crate::utils::clickhouse::{chrono_to_time, micros_to_chrono};

#[derive(Row, Serialize)]
struct ScoreInsert {
    project_id: String,
    id: String,
    name: String,
    source: String,
    data_type: String,
    value: Option<f64>,
    string_value: String,
    comment: String,
    metadata: String,
    config_id: String,
    queue_id: String,
    author_user_id: String,
    trace_id: String,
    session_id: String,
    dataset_run_id: String,
    observation_id: String,
    environment: String,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    timestamp: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    created_at: OffsetDateTime,
    #[serde(with = "clickhouse::serde::time::datetime64::micros")]
    updated_at: OffsetDateTime,
}

pub async fn insert_score(service: &AnalyticsService, row: &ScoreRow) -> Result<(), DataError> {
    let mut insert = service.client().insert::<ScoreInsert>("scores").await?;
    insert
        .write(&ScoreInsert {
            project_id: row.project_id.clone(),
            id: row.id.clone(),
            name: row.name.clone(),
            source: row.source.clone(),
            data_type: row.data_type.clone(),
            value: row.value,
            string_value: row.string_value.clone().unwrap_or_default(),
            comment: row.comment.clone().unwrap_or_default(),
            metadata: row.metadata.clone().unwrap_or_default(),
            config_id: row.config_id.clone().unwrap_or_default(),
            queue_id: row.queue_id.clone().unwrap_or_default(),
            author_user_id: row.author_user_id.clone().unwrap_or_default(),
            trace_id: row.trace_id.clone().unwrap_or_default(),
            session_id: row.session_id.clone().unwrap_or_default(),
            dataset_run_id: row.dataset_run_id.clone().unwrap_or_default(),
            observation_id: row.observation_id.clone().unwrap_or_default(),
            environment: row.environment.clone(),
            timestamp: chrono_to_time(row.timestamp),
            created_at: chrono_to_time(row.created_at),
            updated_at: chrono_to_time(row.updated_at),
        })
        .await?;
    insert.end().await?;
    Ok(())
}

// ============================================================================
// Read path
// ============================================================================

#[derive(Row, Deserialize)]
struct ChScoreRow {
    id: String,
    name: String,
    source: String,
    data_type: String,
    value: Option<f64>,
    string_value: String,
    comment: String,
    metadata: String,
    config_id: String,
    queue_id: String,
    author_user_id: String,
    trace_id: String,
    session_id: String,
    dataset_run_id: String,
    observation_id: String,
    environment: String,
    timestamp: i64,
}

fn none_if_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl From<ChScoreRow> for ScoreRecord {
    fn from(row: ChScoreRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            source: row.source,
            data_type: row.data_type,
            value: row.value,
            string_value: none_if_empty(row.string_value),
            comment: none_if_empty(row.comment),
            metadata: parse_json_column(none_if_empty(row.metadata).as_deref()),
            config_id: none_if_empty(row.config_id),
            queue_id: none_if_empty(row.queue_id),
            author_user_id: none_if_empty(row.author_user_id),
            trace_id: none_if_empty(row.trace_id),
            session_id: none_if_empty(row.session_id),
            dataset_run_id: none_if_empty(row.dataset_run_id),
            observation_id: none_if_empty(row.observation_id),
            environment: row.environment,
            timestamp: micros_to_chrono(row.timestamp),
        }
    }
}

const SELECT_COLUMNS: &str = "id, name, source, data_type, value, string_value, comment, \
     metadata, config_id, queue_id, author_user_id, trace_id, session_id, dataset_run_id, \
     observation_id, environment, toUnixTimestamp64Micro(timestamp) AS timestamp";

fn push_conditions(
    params: &ListScoresParams,
    conditions: &mut Vec<String>,
    sql_params: &mut SqlParams,
) {
    if let Some(name) = &params.name {
        conditions.push("name = ?".into());
        sql_params.push_str(name.clone());
    }
    if let Some(source) = &params.source {
        conditions.push("source = ?".into());
        sql_params.push_str(source.clone());
    }
    if let Some(data_type) = &params.data_type {
        conditions.push("data_type = ?".into());
        sql_params.push_str(data_type.clone());
    }
    if let Some(trace_id) = &params.trace_id {
        conditions.push("trace_id = ?".into());
        sql_params.push_str(trace_id.clone());
    }
    if let Some(session_id) = &params.session_id {
        conditions.push("session_id = ?".into());
        sql_params.push_str(session_id.clone());
    }
    if let Some(observation_id) = &params.observation_id {
        conditions.push("observation_id = ?".into());
        sql_params.push_str(observation_id.clone());
    }
    if let Some(queue_id) = &params.queue_id {
        conditions.push("queue_id = ?".into());
        sql_params.push_str(queue_id.clone());
    }
    if let Some(config_id) = &params.config_id {
        conditions.push("config_id = ?".into());
        sql_params.push_str(config_id.clone());
    }
    if let Some(author) = &params.author_user_id {
        conditions.push("author_user_id = ?".into());
        sql_params.push_str(author.clone());
    }
    if let Some(ids) = &params.score_ids
        && !ids.is_empty()
    {
        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        conditions.push(format!("id IN ({})", placeholders.join(", ")));
        for id in ids {
            sql_params.push_str(id.clone());
        }
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
    if let Some((operator, value)) = &params.value {
        conditions.push(format!("value {} ?", operator.as_sql()));
        sql_params.push_f64(*value);
    }
    if let Some(tags) = &params.trace_tags
        && !tags.is_empty()
    {
        // Scores carry no tags themselves; restrict through the owning traces.
        let tag_conditions: Vec<String> = tags
            .iter()
            .map(|tag| {
                sql_params.push_str(tag.clone());
                "has(tags, ?)".to_string()
            })
            .collect();
        conditions.push(format!(
            "trace_id IN (SELECT id FROM traces FINAL WHERE project_id = ? AND ({}))",
            tag_conditions.join(" OR ")
        ));
        sql_params.push_str(params.project_id.clone());
    }
    if let Some(from) = &params.from_timestamp {
        conditions.push("timestamp >= fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(from.timestamp_micros());
    }
    if let Some(to) = &params.to_timestamp {
        conditions.push("timestamp < fromUnixTimestamp64Micro(?)".into());
        sql_params.push_i64(to.timestamp_micros());
    }
}

fn map_order_column(column: &str) -> &str {
    match column {
        "timestamp" => "timestamp",
        "name" => "name",
        "value" => "value",
        "dataType" => "data_type",
        "source" => "source",
        other => other,
    }
}

pub async fn list_scores(
    service: &AnalyticsService,
    params: &ListScoresParams,
) -> Result<(Vec<ScoreRecord>, u64), DataError> {
    let mut conditions: Vec<String> = vec!["project_id = ?".into()];
    let mut sql_params = SqlParams::default();
    sql_params.push_str(params.project_id.clone());
    push_conditions(params, &mut conditions, &mut sql_params);

    let order = params
        .order_by
        .as_ref()
        .map(|o| o.to_sql_mapped(map_order_column))
        .unwrap_or_else(|| "timestamp DESC".to_string());

    let offset = (params.page.max(1) as u64 - 1) * params.limit as u64;
    let sql = format!(
        "SELECT {} FROM scores FINAL WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
        SELECT_COLUMNS,
        conditions.join(" AND "),
        order,
        params.limit,
        offset
    );
    let rows: Vec<ChScoreRow> = sql_params
        .bind_to(service.client().query(&sql))
        .fetch_all()
        .await?;

    let count_sql = format!(
        "SELECT count() FROM scores FINAL WHERE {}",
        conditions.join(" AND ")
    );
    let total: u64 = sql_params
        .bind_to(service.client().query(&count_sql))
        .fetch_one()
        .await?;

    Ok((rows.into_iter().map(ScoreRecord::from).collect(), total))
}

pub async fn get_score(
    service: &AnalyticsService,
    project_id: &str,
    score_id: &str,
) -> Result<Option<ScoreRecord>, DataError> {
    let sql = format!(
        "SELECT {} FROM scores FINAL WHERE project_id = ? AND id = ? LIMIT 1",
        SELECT_COLUMNS
    );
    let row: Option<ChScoreRow> = service
        .client()
        .query(&sql)
        .bind(project_id)
        .bind(score_id)
        .fetch_optional()
        .await?;
    Ok(row.map(ScoreRecord::from))
}

/// Trace-level scores for the trace detail read.
pub async fn get_scores_for_trace(
    service: &AnalyticsService,
    project_id: &str,
    trace_id: &str,
) -> Result<Vec<ScoreRecord>, DataError> {
    let sql = format!(
        "SELECT {} FROM scores FINAL WHERE project_id = ? AND trace_id = ? \
         ORDER BY timestamp ASC",
        SELECT_COLUMNS
    );
    let rows: Vec<ChScoreRow> = service
        .client()
        .query(&sql)
        .bind(project_id)
        .bind(trace_id)
        .fetch_all()
        .await?;
    Ok(rows.into_iter().map(ScoreRecord::from).collect())
}

pub async fn delete_score(
    service: &AnalyticsService,
    project_id: &str,
    score_id: &str,
) -> Result<(), DataError> {
    service
        .client()
        .query("DELETE FROM scores WHERE project_id = ? AND id = ?")
        .bind(project_id)
        .bind(score_id)
        .execute()
        .await?;
    Ok(())
}
