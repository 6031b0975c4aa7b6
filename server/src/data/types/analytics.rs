//! Read-side records and query parameters for the analytical store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::api::types::OrderBy;
use crate::data::query::Filter;

/// Trace as served by the read API (with derived aggregates)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub id: String,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub environment: String,
    pub tags: Vec<String>,
    pub public: bool,
    pub bookmarked: bool,
    pub timestamp: DateTime<Utc>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    /// Number of observations under this trace
    pub observation_count: u64,
    /// Sum of observation costs (USD)
    pub total_cost: f64,
    /// Root-to-last-end latency in milliseconds
    pub latency_ms: Option<i64>,
}

/// Observation as served by the read API (with derived fields)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub id: String,
    pub trace_id: Option<String>,
    pub parent_observation_id: Option<String>,
    #[serde(rename = "type")]
    pub observation_type: String,
    pub name: Option<String>,
    pub level: String,
    pub status_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completion_start_time: Option<DateTime<Utc>>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    pub model: Option<String>,
    pub model_parameters: Option<Value>,
    pub usage_details: BTreeMap<String, f64>,
    pub cost_details: BTreeMap<String, f64>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub unit: Option<String>,
    pub version: Option<String>,
    pub environment: String,
    pub prompt_id: Option<String>,
    /// end - start, when ended
    pub latency_ms: Option<i64>,
    /// completion start - start, for streamed generations
    pub time_to_first_token_ms: Option<i64>,
    /// Explicit cost total, else the sum of cost components
    pub total_cost: Option<f64>,
}

/// Score as served by the read API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    pub name: String,
    pub source: String,
    pub data_type: String,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub comment: Option<String>,
    pub metadata: Option<Value>,
    pub config_id: Option<String>,
    pub queue_id: Option<String>,
    pub author_user_id: Option<String>,
    pub trace_id: Option<String>,
    pub session_id: Option<String>,
    pub dataset_run_id: Option<String>,
    pub observation_id: Option<String>,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Query parameters
// ============================================================================

#[derive(Debug, Default)]
pub struct ListTracesParams {
    pub project_id: String,
    pub page: u32,
    pub limit: u32,
    pub order_by: Option<OrderBy>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    pub name: Option<String>,
    pub environment: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub from_timestamp: Option<DateTime<Utc>>,
    pub to_timestamp: Option<DateTime<Utc>>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Default)]
pub struct ListObservationsParams {
    pub project_id: String,
    pub page: u32,
    pub limit: u32,
    pub order_by: Option<OrderBy>,
    pub trace_id: Option<String>,
    pub observation_type: Option<String>,
    pub level: Option<String>,
    pub name: Option<String>,
    pub parent_observation_id: Option<String>,
    pub environment: Option<Vec<String>>,
    pub from_start_time: Option<DateTime<Utc>>,
    pub to_start_time: Option<DateTime<Utc>>,
    pub filters: Vec<Filter>,
}

/// Numeric comparison applied to score values
#[derive(Debug, Clone, Copy)]
pub enum ScoreValueOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl ScoreValueOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "=" => Some(Self::Eq),
            "!=" | "<>" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            ">=" => Some(Self::Gte),
            "<=" => Some(Self::Lte),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ListScoresParams {
    pub project_id: String,
    pub page: u32,
    pub limit: u32,
    pub order_by: Option<OrderBy>,
    pub name: Option<String>,
    pub source: Option<String>,
    pub data_type: Option<String>,
    pub trace_id: Option<String>,
    pub session_id: Option<String>,
    pub observation_id: Option<String>,
    pub queue_id: Option<String>,
    pub config_id: Option<String>,
    pub author_user_id: Option<String>,
    pub score_ids: Option<Vec<String>>,
    pub trace_tags: Option<Vec<String>>,
    pub environment: Option<Vec<String>>,
    pub value: Option<(ScoreValueOperator, f64)>,
    pub from_timestamp: Option<DateTime<Utc>>,
    pub to_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_operator_parse() {
        assert!(matches!(
            ScoreValueOperator::parse(">="),
            Some(ScoreValueOperator::Gte)
        ));
        assert!(matches!(
            ScoreValueOperator::parse("<>"),
            Some(ScoreValueOperator::Ne)
        ));
        assert!(ScoreValueOperator::parse("~").is_none());
    }

    #[test]
    fn observation_record_serializes_type_key() {
        let record = ObservationRecord {
            id: "o1".into(),
            trace_id: Some("t1".into()),
            parent_observation_id: None,
            observation_type: "GENERATION".into(),
            name: None,
            level: "DEFAULT".into(),
            status_message: None,
            start_time: Utc::now(),
            end_time: None,
            completion_start_time: None,
            input: None,
            output: None,
            metadata: None,
            model: None,
            model_parameters: None,
            usage_details: BTreeMap::new(),
            cost_details: BTreeMap::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            unit: None,
            version: None,
            environment: "default".into(),
            prompt_id: None,
            latency_ms: None,
            time_to_first_token_ms: None,
            total_cost: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "GENERATION");
        assert_eq!(json["traceId"], "t1");
    }
}
