//! Per-event validation
//!
//! Turns raw batch items into typed commands. Failures are per-event; the
//! batch as a whole never fails here.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::core::constants::{
    DEFAULT_ENVIRONMENT, ENVIRONMENT_PATTERN, MAX_NAME_LENGTH, RESERVED_ENVIRONMENT_PREFIX,
};
use crate::utils::json::finite_f64;

use super::patch::Patch;
use super::types::{
    EventPayload, IngestionEvent, ObservationBody, ObservationType, ScoreBody, ScoreDataType,
    SdkLogBody, TraceBody, UsageBody,
};

static ENVIRONMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ENVIRONMENT_PATTERN).expect("environment pattern compiles"));

/// Maximum id length accepted on events and bodies
pub const MAX_ID_LENGTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid event: {0}")]
    Schema(String),
    #[error("Invalid id: {0}")]
    Id(String),
    #[error("Invalid name: {0}")]
    Name(String),
    #[error("Invalid environment: {0}")]
    Environment(String),
    #[error("Invalid score: {0}")]
    Score(String),
    #[error("Invalid timestamps: {0}")]
    Timestamps(String),
}

// ============================================================================
// COMMANDS
// ============================================================================

/// Entity classes addressed by commands (used for keyed serialization and
/// the event-log path)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Trace,
    Observation,
    Score,
    SdkLog,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Observation => "observation",
            Self::Score => "score",
            Self::SdkLog => "sdk-log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceCommand {
    pub trace_id: String,
    pub environment: String,
    pub body: TraceBody,
}

#[derive(Debug, Clone)]
pub struct ObservationCommand {
    pub observation_id: String,
    pub observation_type: ObservationType,
    /// `*-update` events require a pre-existing row
    pub is_update: bool,
    pub environment: String,
    pub usage_details: BTreeMap<String, f64>,
    pub cost_details: BTreeMap<String, f64>,
    pub body: ObservationBody,
}

#[derive(Debug, Clone)]
pub struct ScoreCommand {
    pub score_id: String,
    pub data_type: ScoreDataType,
    pub environment: String,
    pub body: ScoreBody,
}

#[derive(Debug, Clone)]
pub struct SdkLogCommand {
    pub log: Value,
}

#[derive(Debug, Clone)]
pub enum Command {
    UpsertTrace(TraceCommand),
    UpsertObservation(ObservationCommand),
    UpsertScore(ScoreCommand),
    SdkLog(SdkLogCommand),
}

impl Command {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::UpsertTrace(_) => EntityKind::Trace,
            Self::UpsertObservation(_) => EntityKind::Observation,
            Self::UpsertScore(_) => EntityKind::Score,
            Self::SdkLog(_) => EntityKind::SdkLog,
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        match self {
            Self::UpsertTrace(c) => Some(&c.trace_id),
            Self::UpsertObservation(c) => Some(&c.observation_id),
            Self::UpsertScore(c) => Some(&c.score_id),
            Self::SdkLog(_) => None,
        }
    }
}

/// A validated event: the typed command plus correlation data.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    /// Original JSON, preserved verbatim for the append-only event log
    pub raw: Value,
    pub command: Command,
}

// ============================================================================
// VALIDATION
// ============================================================================

fn check_id(label: &str, id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::Id(format!("{label} must not be empty")));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(ValidationError::Id(format!(
            "{label} exceeds {MAX_ID_LENGTH} characters"
        )));
    }
    if id.contains('\r') {
        return Err(ValidationError::Id(format!(
            "{label} must not contain carriage returns"
        )));
    }
    Ok(())
}

fn check_opt_id(label: &str, id: Option<&String>) -> Result<(), ValidationError> {
    match id {
        Some(id) => check_id(label, id),
        None => Ok(()),
    }
}

fn check_name(name: &Patch<String>) -> Result<(), ValidationError> {
    if let Patch::Value(name) = name
        && name.len() > MAX_NAME_LENGTH
    {
        return Err(ValidationError::Name(format!(
            "name exceeds {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}

/// Normalize and validate an environment string; absent means "default".
pub fn resolve_environment(env: Option<&String>) -> Result<String, ValidationError> {
    let Some(env) = env else {
        return Ok(DEFAULT_ENVIRONMENT.to_string());
    };
    if !ENVIRONMENT_RE.is_match(env) {
        return Err(ValidationError::Environment(format!(
            "{env:?} does not match {ENVIRONMENT_PATTERN}"
        )));
    }
    if env.starts_with(RESERVED_ENVIRONMENT_PREFIX) {
        return Err(ValidationError::Environment(format!(
            "prefix {RESERVED_ENVIRONMENT_PREFIX:?} is reserved"
        )));
    }
    Ok(env.clone())
}

/// Scrub a details map to finite numbers; non-finite and non-numeric
/// entries are silently dropped.
fn sanitize_details(details: Option<&BTreeMap<String, Value>>) -> BTreeMap<String, f64> {
    details
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| finite_f64(v).map(|n| (k.clone(), n)))
                .collect()
        })
        .unwrap_or_default()
}

/// Fold the legacy inline `usage` record into usage details, newer names
/// first. Explicit usage-details keys always win.
fn fold_legacy_usage(usage: Option<&UsageBody>, details: &mut BTreeMap<String, f64>) {
    let Some(usage) = usage else { return };
    let pairs = [
        ("input", usage.input.or(usage.prompt_tokens)),
        ("output", usage.output.or(usage.completion_tokens)),
        ("total", usage.total.or(usage.total_tokens)),
    ];
    for (key, value) in pairs {
        if let Some(v) = value.filter(|v| v.is_finite())
            && !details.contains_key(key)
        {
            details.insert(key.to_string(), v);
        }
    }
}

fn mint_id(id: Option<String>) -> String {
    id.unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn validate_trace(body: TraceBody) -> Result<Command, ValidationError> {
    check_opt_id("trace id", body.id.as_ref())?;
    if let Patch::Value(session_id) = &body.session_id {
        check_id("session id", session_id)?;
    }
    check_name(&body.name)?;
    let environment = resolve_environment(body.environment.as_ref())?;
    let trace_id = mint_id(body.id.clone());
    Ok(Command::UpsertTrace(TraceCommand {
        trace_id,
        environment,
        body,
    }))
}

fn validate_observation(
    body: ObservationBody,
    implied_type: Option<ObservationType>,
    is_update: bool,
) -> Result<Command, ValidationError> {
    check_opt_id("observation id", body.id.as_ref())?;
    check_opt_id("trace id", body.trace_id.as_ref())?;
    if let Patch::Value(parent) = &body.parent_observation_id {
        check_id("parent observation id", parent)?;
    }
    check_name(&body.name)?;
    let environment = resolve_environment(body.environment.as_ref())?;

    if let (Some(start), Patch::Value(end)) = (&body.start_time, &body.end_time)
        && end < start
    {
        return Err(ValidationError::Timestamps(
            "endTime precedes startTime".to_string(),
        ));
    }
    if let (Some(start), Patch::Value(completion)) = (&body.start_time, &body.completion_start_time)
        && completion < start
    {
        return Err(ValidationError::Timestamps(
            "completionStartTime precedes startTime".to_string(),
        ));
    }

    let observation_type = implied_type
        .or(body.observation_type)
        .unwrap_or_default();

    let mut usage_details = sanitize_details(body.usage_details.as_ref());
    fold_legacy_usage(body.usage.as_ref(), &mut usage_details);
    let cost_details = sanitize_details(body.cost_details.as_ref());

    let observation_id = mint_id(body.id.clone());
    Ok(Command::UpsertObservation(ObservationCommand {
        observation_id,
        observation_type,
        is_update,
        environment,
        usage_details,
        cost_details,
        body,
    }))
}

fn validate_score(mut body: ScoreBody) -> Result<Command, ValidationError> {
    check_opt_id("score id", body.id.as_ref())?;
    check_opt_id("trace id", body.trace_id.as_ref())?;
    check_opt_id("session id", body.session_id.as_ref())?;
    check_opt_id("dataset run id", body.dataset_run_id.as_ref())?;
    check_opt_id("observation id", body.observation_id.as_ref())?;
    if body.name.is_empty() || body.name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::Name(format!(
            "score name must be 1..={MAX_NAME_LENGTH} bytes"
        )));
    }

    let targets = [
        body.trace_id.is_some(),
        body.session_id.is_some(),
        body.dataset_run_id.is_some(),
    ];
    if targets.iter().filter(|t| **t).count() != 1 {
        return Err(ValidationError::Score(
            "exactly one of traceId, sessionId, datasetRunId is required".to_string(),
        ));
    }
    if body.observation_id.is_some() && body.trace_id.is_none() {
        return Err(ValidationError::Score(
            "observationId requires traceId".to_string(),
        ));
    }

    let data_type = body.data_type.unwrap_or(if body.string_value.is_some() {
        ScoreDataType::Categorical
    } else {
        ScoreDataType::Numeric
    });

    match data_type {
        ScoreDataType::Numeric => {
            // stored stringValue is always null for numeric scores
            body.string_value = None;
        }
        ScoreDataType::Categorical => {
            if body.string_value.is_none() {
                return Err(ValidationError::Score(
                    "CATEGORICAL scores require stringValue".to_string(),
                ));
            }
            body.value = None;
        }
        ScoreDataType::Boolean => {
            let value = body.value.ok_or_else(|| {
                ValidationError::Score("BOOLEAN scores require value 0 or 1".to_string())
            })?;
            if value != 0.0 && value != 1.0 {
                return Err(ValidationError::Score(
                    "BOOLEAN score value must be 0 or 1".to_string(),
                ));
            }
            body.string_value =
                Some(if value == 1.0 { "True" } else { "False" }.to_string());
        }
    }

    let environment = resolve_environment(body.environment.as_ref())?;
    let score_id = mint_id(body.id.clone());
    Ok(Command::UpsertScore(ScoreCommand {
        score_id,
        data_type,
        environment,
        body,
    }))
}

fn validate_sdk_log(body: SdkLogBody) -> Result<Command, ValidationError> {
    Ok(Command::SdkLog(SdkLogCommand { log: body.log }))
}

/// Validate one raw batch item into a typed command.
pub fn parse_event(raw: Value) -> Result<ParsedEvent, ValidationError> {
    let event: IngestionEvent = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::Schema(e.to_string()))?;
    check_id("event id", &event.id)?;

    use EventPayload as P;
    use ObservationType as T;
    let command = match event.payload {
        P::TraceCreate(body) => validate_trace(*body)?,
        P::ObservationCreate(body) => validate_observation(*body, None, false)?,
        P::ObservationUpdate(body) => validate_observation(*body, None, true)?,
        P::EventCreate(body) => validate_observation(*body, Some(T::Event), false)?,
        P::SpanCreate(body) => validate_observation(*body, Some(T::Span), false)?,
        P::SpanUpdate(body) => validate_observation(*body, Some(T::Span), true)?,
        P::GenerationCreate(body) => validate_observation(*body, Some(T::Generation), false)?,
        P::GenerationUpdate(body) => validate_observation(*body, Some(T::Generation), true)?,
        P::AgentCreate(body) => validate_observation(*body, Some(T::Agent), false)?,
        P::ToolCreate(body) => validate_observation(*body, Some(T::Tool), false)?,
        P::ChainCreate(body) => validate_observation(*body, Some(T::Chain), false)?,
        P::RetrieverCreate(body) => validate_observation(*body, Some(T::Retriever), false)?,
        P::EvaluatorCreate(body) => validate_observation(*body, Some(T::Evaluator), false)?,
        P::EmbeddingCreate(body) => validate_observation(*body, Some(T::Embedding), false)?,
        P::GuardrailCreate(body) => validate_observation(*body, Some(T::Guardrail), false)?,
        P::ScoreCreate(body) => validate_score(*body)?,
        P::SdkLog(body) => validate_sdk_log(*body)?,
    };

    Ok(ParsedEvent {
        event_id: event.id,
        timestamp: event.timestamp,
        raw,
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, body: Value) -> Value {
        json!({
            "id": "evt-1",
            "type": event_type,
            "timestamp": "2025-01-01T00:00:00Z",
            "body": body
        })
    }

    #[test]
    fn carriage_return_in_id_is_rejected() {
        let err = parse_event(event("trace-create", json!({"id": "tr\r1"}))).unwrap_err();
        assert!(matches!(err, ValidationError::Id(_)));
    }

    #[test]
    fn oversized_name_is_rejected() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        let err = parse_event(event("trace-create", json!({"id": "t", "name": long})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Name(_)));
    }

    #[test]
    fn invalid_environment_is_rejected() {
        for env in ["PROD", "has space", "", "lumitrace-internal"] {
            let err = parse_event(event(
                "trace-create",
                json!({"id": "t", "environment": env}),
            ))
            .unwrap_err();
            assert!(matches!(err, ValidationError::Environment(_)), "{env}");
        }
    }

    #[test]
    fn absent_environment_defaults() {
        let parsed = parse_event(event("trace-create", json!({"id": "t"}))).unwrap();
        match parsed.command {
            Command::UpsertTrace(cmd) => assert_eq!(cmd.environment, "default"),
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn absent_id_is_minted() {
        let parsed = parse_event(event("trace-create", json!({}))).unwrap();
        let id = parsed.command.entity_id().unwrap().to_string();
        assert!(Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn non_finite_usage_values_are_dropped() {
        let parsed = parse_event(event(
            "generation-create",
            json!({
                "id": "g",
                "traceId": "t",
                "usageDetails": {"input": 5, "bogus": "NaN", "other": null}
            }),
        ))
        .unwrap();
        match parsed.command {
            Command::UpsertObservation(cmd) => {
                assert_eq!(cmd.usage_details.len(), 1);
                assert_eq!(cmd.usage_details["input"], 5.0);
            }
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn legacy_usage_folds_into_details() {
        let parsed = parse_event(event(
            "generation-create",
            json!({
                "id": "g",
                "traceId": "t",
                "usage": {"promptTokens": 3, "completionTokens": 4}
            }),
        ))
        .unwrap();
        match parsed.command {
            Command::UpsertObservation(cmd) => {
                assert_eq!(cmd.usage_details["input"], 3.0);
                assert_eq!(cmd.usage_details["output"], 4.0);
            }
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn legacy_observation_type_from_body() {
        let parsed = parse_event(event(
            "observation-create",
            json!({"id": "o", "traceId": "t", "type": "GENERATION"}),
        ))
        .unwrap();
        match parsed.command {
            Command::UpsertObservation(cmd) => {
                assert_eq!(cmd.observation_type, ObservationType::Generation);
                assert!(!cmd.is_update);
            }
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = parse_event(event(
            "span-create",
            json!({
                "id": "s",
                "startTime": "2025-01-01T00:01:00Z",
                "endTime": "2025-01-01T00:00:00Z"
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Timestamps(_)));
    }

    #[test]
    fn categorical_score_without_string_value_is_rejected() {
        let err = parse_event(event(
            "score-create",
            json!({
                "id": "s",
                "name": "quality",
                "traceId": "t",
                "dataType": "CATEGORICAL",
                "value": 1,
                "stringValue": null
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Score(_)));
    }

    #[test]
    fn numeric_score_drops_string_value() {
        let parsed = parse_event(event(
            "score-create",
            json!({
                "id": "s",
                "name": "latency",
                "traceId": "t",
                "dataType": "NUMERIC",
                "value": 0.9,
                "stringValue": "fast"
            }),
        ))
        .unwrap();
        match parsed.command {
            Command::UpsertScore(cmd) => {
                assert_eq!(cmd.body.value, Some(0.9));
                assert_eq!(cmd.body.string_value, None);
            }
            other => panic!("wrong command: {:?}", other),
        }
    }

    #[test]
    fn boolean_score_derives_string_value() {
        let parsed = parse_event(event(
            "score-create",
            json!({
                "id": "s",
                "name": "helpful",
                "traceId": "t",
                "dataType": "BOOLEAN",
                "value": 1
            }),
        ))
        .unwrap();
        match parsed.command {
            Command::UpsertScore(cmd) => {
                assert_eq!(cmd.body.string_value.as_deref(), Some("True"));
            }
            other => panic!("wrong command: {:?}", other),
        }

        let err = parse_event(event(
            "score-create",
            json!({"id": "s", "name": "helpful", "traceId": "t", "dataType": "BOOLEAN", "value": 0.5}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Score(_)));
    }

    #[test]
    fn score_requires_exactly_one_target() {
        let err = parse_event(event(
            "score-create",
            json!({"id": "s", "name": "n", "value": 1}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Score(_)));

        let err = parse_event(event(
            "score-create",
            json!({"id": "s", "name": "n", "value": 1, "traceId": "t", "sessionId": "sess"}),
        ))
        .unwrap_err();
        assert!(matches!(err, ValidationError::Score(_)));
    }
}
