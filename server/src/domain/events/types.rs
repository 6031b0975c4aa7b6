//! Ingestion event wire types
//!
//! Events arrive as a batch of tagged records `{ id, type, timestamp, body }`.
//! The tag set is closed; unknown tags fail the individual event, not the
//! batch.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::patch::Patch;

// ============================================================================
// CLASSIFICATION ENUMS
// ============================================================================

/// Observation node types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationType {
    Event,
    #[default]
    Span,
    Generation,
    Agent,
    Tool,
    Chain,
    Retriever,
    Evaluator,
    Embedding,
    Guardrail,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "EVENT",
            Self::Span => "SPAN",
            Self::Generation => "GENERATION",
            Self::Agent => "AGENT",
            Self::Tool => "TOOL",
            Self::Chain => "CHAIN",
            Self::Retriever => "RETRIEVER",
            Self::Evaluator => "EVALUATOR",
            Self::Embedding => "EMBEDDING",
            Self::Guardrail => "GUARDRAIL",
        }
    }

    /// Types that participate in agent-graph reconstruction
    pub fn is_graph_relevant(&self) -> bool {
        matches!(
            self,
            Self::Agent | Self::Tool | Self::Chain | Self::Retriever | Self::Embedding
        )
    }
}

/// Observation severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationLevel {
    Debug,
    #[default]
    Default,
    Warning,
    Error,
}

impl ObservationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Default => "DEFAULT",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Score origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreSource {
    #[default]
    Api,
    Eval,
    Annotation,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "API",
            Self::Eval => "EVAL",
            Self::Annotation => "ANNOTATION",
        }
    }
}

/// Score value discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreDataType {
    Numeric,
    Categorical,
    Boolean,
}

impl ScoreDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "NUMERIC",
            Self::Categorical => "CATEGORICAL",
            Self::Boolean => "BOOLEAN",
        }
    }
}

// ============================================================================
// EVENT BODIES
// ============================================================================

/// Body of `trace-create`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    pub id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Patch<String>,
    #[serde(default)]
    pub user_id: Patch<String>,
    #[serde(default)]
    pub session_id: Patch<String>,
    #[serde(default)]
    pub input: Patch<Value>,
    #[serde(default)]
    pub output: Patch<Value>,
    pub metadata: Option<Value>,
    #[serde(default)]
    pub release: Patch<String>,
    #[serde(default)]
    pub version: Patch<String>,
    #[serde(default)]
    pub tags: Patch<Vec<String>>,
    #[serde(default)]
    pub public: Patch<bool>,
    pub environment: Option<String>,
}

/// Legacy inline usage record on generation events.
///
/// Carries either the old `promptTokens`/`completionTokens` names or the
/// newer `input`/`output`/`total` names; both normalize into usage details.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageBody {
    pub input: Option<f64>,
    pub output: Option<f64>,
    pub total: Option<f64>,
    pub prompt_tokens: Option<f64>,
    pub completion_tokens: Option<f64>,
    pub total_tokens: Option<f64>,
    pub unit: Option<String>,
}

/// Body shared by all observation event types
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationBody {
    pub id: Option<String>,
    pub trace_id: Option<String>,
    /// Only meaningful on legacy `observation-*` events
    #[serde(rename = "type")]
    pub observation_type: Option<ObservationType>,
    #[serde(default)]
    pub name: Patch<String>,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Patch<DateTime<Utc>>,
    #[serde(default)]
    pub completion_start_time: Patch<DateTime<Utc>>,
    pub metadata: Option<Value>,
    pub level: Option<ObservationLevel>,
    #[serde(default)]
    pub status_message: Patch<String>,
    #[serde(default)]
    pub parent_observation_id: Patch<String>,
    #[serde(default)]
    pub version: Patch<String>,
    #[serde(default)]
    pub input: Patch<Value>,
    #[serde(default)]
    pub output: Patch<Value>,
    #[serde(default)]
    pub model: Patch<String>,
    #[serde(default)]
    pub model_parameters: Patch<Value>,
    pub usage: Option<UsageBody>,
    pub usage_details: Option<BTreeMap<String, Value>>,
    pub cost_details: Option<BTreeMap<String, Value>>,
    pub prompt_name: Option<String>,
    pub prompt_version: Option<i32>,
    pub environment: Option<String>,
}

/// Body of `score-create`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub id: Option<String>,
    pub name: String,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub data_type: Option<ScoreDataType>,
    pub trace_id: Option<String>,
    pub session_id: Option<String>,
    pub dataset_run_id: Option<String>,
    pub observation_id: Option<String>,
    pub comment: Option<String>,
    pub metadata: Option<Value>,
    pub config_id: Option<String>,
    pub environment: Option<String>,
}

/// Body of `sdk-log`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkLogBody {
    pub log: Value,
}

// ============================================================================
// EVENT ENVELOPE
// ============================================================================

/// One batch event, fully typed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// The closed set of event types, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum EventPayload {
    #[serde(rename = "trace-create")]
    TraceCreate(Box<TraceBody>),
    #[serde(rename = "observation-create")]
    ObservationCreate(Box<ObservationBody>),
    #[serde(rename = "observation-update")]
    ObservationUpdate(Box<ObservationBody>),
    #[serde(rename = "event-create")]
    EventCreate(Box<ObservationBody>),
    #[serde(rename = "span-create")]
    SpanCreate(Box<ObservationBody>),
    #[serde(rename = "span-update")]
    SpanUpdate(Box<ObservationBody>),
    #[serde(rename = "generation-create")]
    GenerationCreate(Box<ObservationBody>),
    #[serde(rename = "generation-update")]
    GenerationUpdate(Box<ObservationBody>),
    #[serde(rename = "agent-create")]
    AgentCreate(Box<ObservationBody>),
    #[serde(rename = "tool-create")]
    ToolCreate(Box<ObservationBody>),
    #[serde(rename = "chain-create")]
    ChainCreate(Box<ObservationBody>),
    #[serde(rename = "retriever-create")]
    RetrieverCreate(Box<ObservationBody>),
    #[serde(rename = "evaluator-create")]
    EvaluatorCreate(Box<ObservationBody>),
    #[serde(rename = "embedding-create")]
    EmbeddingCreate(Box<ObservationBody>),
    #[serde(rename = "guardrail-create")]
    GuardrailCreate(Box<ObservationBody>),
    #[serde(rename = "score-create")]
    ScoreCreate(Box<ScoreBody>),
    #[serde(rename = "sdk-log")]
    SdkLog(Box<SdkLogBody>),
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TraceCreate(_) => "trace-create",
            Self::ObservationCreate(_) => "observation-create",
            Self::ObservationUpdate(_) => "observation-update",
            Self::EventCreate(_) => "event-create",
            Self::SpanCreate(_) => "span-create",
            Self::SpanUpdate(_) => "span-update",
            Self::GenerationCreate(_) => "generation-create",
            Self::GenerationUpdate(_) => "generation-update",
            Self::AgentCreate(_) => "agent-create",
            Self::ToolCreate(_) => "tool-create",
            Self::ChainCreate(_) => "chain-create",
            Self::RetrieverCreate(_) => "retriever-create",
            Self::EvaluatorCreate(_) => "evaluator-create",
            Self::EmbeddingCreate(_) => "embedding-create",
            Self::GuardrailCreate(_) => "guardrail-create",
            Self::ScoreCreate(_) => "score-create",
            Self::SdkLog(_) => "sdk-log",
        }
    }
}

/// The batch envelope accepted by the ingestion endpoint.
///
/// Batch items stay as raw JSON here so a malformed item fails that item
/// alone during validation, never the envelope.
#[derive(Debug, Deserialize)]
pub struct IngestionBatch {
    pub batch: Vec<Value>,
    pub metadata: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trace_create_round_trip() {
        let event: IngestionEvent = serde_json::from_value(json!({
            "id": "evt-1",
            "type": "trace-create",
            "timestamp": "2025-01-01T00:00:00Z",
            "body": {
                "id": "tr-1",
                "name": "checkout",
                "tags": ["prod"],
                "metadata": {"step": 1}
            }
        }))
        .unwrap();
        assert_eq!(event.id, "evt-1");
        match event.payload {
            EventPayload::TraceCreate(body) => {
                assert_eq!(body.id.as_deref(), Some("tr-1"));
                assert_eq!(body.name, Patch::Value("checkout".to_string()));
                assert_eq!(body.user_id, Patch::Missing);
            }
            other => panic!("wrong payload: {:?}", other),
        }
    }

    #[test]
    fn typed_observation_event_parses() {
        let event: IngestionEvent = serde_json::from_value(json!({
            "id": "evt-2",
            "type": "generation-create",
            "timestamp": "2025-01-01T00:00:00Z",
            "body": {
                "id": "g-1",
                "traceId": "tr-1",
                "model": "gpt-4",
                "usageDetails": {"input": 5, "output": 7}
            }
        }))
        .unwrap();
        match event.payload {
            EventPayload::GenerationCreate(body) => {
                assert_eq!(body.model, Patch::Value("gpt-4".to_string()));
                assert_eq!(body.usage_details.unwrap().len(), 2);
            }
            other => panic!("wrong payload: {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_fails() {
        let result: Result<IngestionEvent, _> = serde_json::from_value(json!({
            "id": "evt-3",
            "type": "dataset-create",
            "timestamp": "2025-01-01T00:00:00Z",
            "body": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn observation_type_serde_uses_screaming_case() {
        let t: ObservationType = serde_json::from_value(json!("GENERATION")).unwrap();
        assert_eq!(t, ObservationType::Generation);
        assert!(serde_json::from_value::<ObservationType>(json!("generation")).is_err());
    }

    #[test]
    fn graph_relevant_types() {
        assert!(ObservationType::Agent.is_graph_relevant());
        assert!(ObservationType::Retriever.is_graph_relevant());
        assert!(!ObservationType::Generation.is_graph_relevant());
        assert!(!ObservationType::Guardrail.is_graph_relevant());
    }
}
