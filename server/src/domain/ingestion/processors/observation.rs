//! Observation processor
//!
//! Resolves the effective type, creates a parent trace when none is
//! referenced, merges state, derives missing token counts via the model
//! tokenizer and resolves prompt linkage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::data::analytics::repositories::observation as analytics_observation;
use crate::data::analytics::repositories::trace as analytics_trace;
use crate::data::transactional::repositories::{
    observation as observation_repo, prompt as prompt_repo, trace as trace_repo,
};
use crate::data::types::{ObservationRow, TraceRow, encode_json_column, parse_json_column};
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::events::ObservationCommand;
use crate::domain::ingestion::tokens::count_tokens;

use super::super::error::IngestionError;
use super::trace::merge_metadata_ordered;

/// Derive missing token counts.
///
/// Explicit usage keys always win; the tokenizer only fills gaps, and only
/// from the event's own payloads and model (stored state is never
/// re-tokenized). The total defaults to input + output.
pub fn derive_usage(
    usage: &mut BTreeMap<String, f64>,
    model: Option<&str>,
    input: Option<&serde_json::Value>,
    output: Option<&serde_json::Value>,
) {
    if let Some(model) = model {
        if !usage.contains_key("input")
            && let Some(payload) = input
            && let Some(count) = count_tokens(model, payload)
        {
            usage.insert("input".to_string(), count as f64);
        }
        if !usage.contains_key("output")
            && let Some(payload) = output
            && let Some(count) = count_tokens(model, payload)
        {
            usage.insert("output".to_string(), count as f64);
        }
    }
    if !usage.contains_key("total") {
        let input = usage.get("input").copied().unwrap_or(0.0);
        let output = usage.get("output").copied().unwrap_or(0.0);
        if input > 0.0 || output > 0.0 {
            usage.insert("total".to_string(), input + output);
        }
    }
}

fn encode_details(details: &BTreeMap<String, f64>) -> Option<String> {
    if details.is_empty() {
        None
    } else {
        serde_json::to_string(details).ok()
    }
}

fn parse_details(raw: Option<&str>) -> BTreeMap<String, f64> {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

/// Apply one observation command; writes the merged row to both stores.
pub async fn process_observation(
    transactional: &TransactionalService,
    analytics: &AnalyticsService,
    project_id: &str,
    command: &ObservationCommand,
    event_ts: DateTime<Utc>,
) -> Result<(), IngestionError> {
    let pool = transactional.pool();
    let body = &command.body;
    let now = Utc::now();

    let existing = observation_repo::get_observation(pool, project_id, &command.observation_id)
        .await?;

    if command.is_update && existing.is_none() {
        return Err(IngestionError::NotFound(format!(
            "Observation {}",
            command.observation_id
        )));
    }

    // An observation without any trace reference creates its own trace.
    let trace_id = match (&body.trace_id, &existing) {
        (Some(trace_id), _) => Some(trace_id.clone()),
        (None, Some(stored)) => stored.trace_id.clone(),
        (None, None) => {
            let minted = uuid::Uuid::new_v4().to_string();
            let trace = TraceRow {
                id: minted.clone(),
                project_id: project_id.to_string(),
                name: body.name.value().cloned(),
                user_id: None,
                session_id: None,
                input: None,
                output: None,
                metadata: None,
                release: None,
                version: None,
                tags: None,
                public: false,
                bookmarked: false,
                environment: command.environment.clone(),
                timestamp: body.start_time.unwrap_or(event_ts),
                event_ts,
                created_at: now,
                updated_at: now,
            };
            trace_repo::upsert_trace(pool, &trace).await?;
            analytics_trace::insert_trace(analytics, &trace).await?;
            tracing::debug!(
                observation_id = %command.observation_id,
                trace_id = %minted,
                "Created implicit trace for observation without traceId"
            );
            Some(minted)
        }
    };

    // Usage: stored details stay, event details overwrite key-wise, then
    // the tokenizer fills what is still missing.
    let mut usage = existing
        .as_ref()
        .map(|row| parse_details(row.usage_details.as_deref()))
        .unwrap_or_default();
    for (key, value) in &command.usage_details {
        usage.insert(key.clone(), *value);
    }
    derive_usage(
        &mut usage,
        body.model.value().map(String::as_str),
        body.input.value(),
        body.output.value(),
    );

    let mut costs = existing
        .as_ref()
        .map(|row| parse_details(row.cost_details.as_deref()))
        .unwrap_or_default();
    for (key, value) in &command.cost_details {
        costs.insert(key.clone(), *value);
    }

    let prompt_tokens = usage.get("input").copied().unwrap_or(0.0) as i64;
    let completion_tokens = usage.get("output").copied().unwrap_or(0.0) as i64;
    let total_tokens = usage
        .get("total")
        .copied()
        .unwrap_or((prompt_tokens + completion_tokens) as f64) as i64;

    // Prompt linkage: resolution failures warn, never fail the event.
    let mut prompt_id = existing.as_ref().and_then(|row| row.prompt_id.clone());
    if let (Some(prompt_name), Some(prompt_version)) = (&body.prompt_name, body.prompt_version) {
        match prompt_repo::get_prompt_by_version(pool, project_id, prompt_name, prompt_version)
            .await?
        {
            Some(prompt) => prompt_id = Some(prompt.id),
            None => tracing::warn!(
                observation_id = %command.observation_id,
                prompt_name = %prompt_name,
                prompt_version,
                "Prompt linkage unresolved"
            ),
        }
    }

    let row = match existing {
        Some(stored) => {
            let stored_metadata = parse_json_column(stored.metadata.as_deref());
            let metadata = merge_metadata_ordered(
                stored_metadata.as_ref(),
                stored.event_ts,
                body.metadata.as_ref(),
                event_ts,
            );
            ObservationRow {
                id: stored.id,
                project_id: stored.project_id,
                trace_id,
                parent_observation_id: body
                    .parent_observation_id
                    .clone()
                    .apply(stored.parent_observation_id),
                observation_type: command.observation_type.as_str().to_string(),
                name: body.name.clone().apply(stored.name),
                level: body
                    .level
                    .map(|l| l.as_str().to_string())
                    .unwrap_or(stored.level),
                status_message: body.status_message.clone().apply(stored.status_message),
                start_time: body.start_time.unwrap_or(stored.start_time),
                end_time: body.end_time.clone().apply(stored.end_time),
                completion_start_time: body
                    .completion_start_time
                    .clone()
                    .apply(stored.completion_start_time),
                input: body
                    .input
                    .as_ref()
                    .map(|v| v.to_string())
                    .apply(stored.input),
                output: body
                    .output
                    .as_ref()
                    .map(|v| v.to_string())
                    .apply(stored.output),
                metadata: encode_json_column(metadata.as_ref()),
                model: body.model.clone().apply(stored.model),
                model_parameters: body
                    .model_parameters
                    .as_ref()
                    .map(|v| v.to_string())
                    .apply(stored.model_parameters),
                usage_details: encode_details(&usage),
                cost_details: encode_details(&costs),
                prompt_tokens,
                completion_tokens,
                total_tokens,
                unit: body.usage.as_ref().and_then(|u| u.unit.clone()).or(stored.unit),
                version: body.version.clone().apply(stored.version),
                environment: command.environment.clone(),
                prompt_id,
                event_ts: stored.event_ts.max(event_ts),
                created_at: stored.created_at,
                updated_at: now,
            }
        }
        None => ObservationRow {
            id: command.observation_id.clone(),
            project_id: project_id.to_string(),
            trace_id,
            parent_observation_id: body.parent_observation_id.clone().into_value(),
            observation_type: command.observation_type.as_str().to_string(),
            name: body.name.clone().into_value(),
            level: body.level.unwrap_or_default().as_str().to_string(),
            status_message: body.status_message.clone().into_value(),
            start_time: body.start_time.unwrap_or(event_ts),
            end_time: body.end_time.clone().into_value(),
            completion_start_time: body.completion_start_time.clone().into_value(),
            input: body.input.value().map(|v| v.to_string()),
            output: body.output.value().map(|v| v.to_string()),
            metadata: encode_json_column(body.metadata.as_ref()),
            model: body.model.clone().into_value(),
            model_parameters: body.model_parameters.value().map(|v| v.to_string()),
            usage_details: encode_details(&usage),
            cost_details: encode_details(&costs),
            prompt_tokens,
            completion_tokens,
            total_tokens,
            unit: body.usage.as_ref().and_then(|u| u.unit.clone()),
            version: body.version.clone().into_value(),
            environment: command.environment.clone(),
            prompt_id,
            event_ts,
            created_at: now,
            updated_at: now,
        },
    };

    observation_repo::upsert_observation(pool, &row).await?;
    analytics_observation::insert_observation(analytics, &row).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn explicit_usage_wins_over_tokenizer() {
        let mut usage = BTreeMap::from([("input".to_string(), 100.0)]);
        derive_usage(
            &mut usage,
            Some("gpt-4"),
            Some(&json!("hello")),
            Some(&json!("world")),
        );
        assert_eq!(usage["input"], 100.0);
        assert!(usage["output"] > 0.0);
        assert_eq!(usage["total"], usage["input"] + usage["output"]);
    }

    #[test]
    fn tokenizer_fills_missing_counts() {
        let mut usage = BTreeMap::new();
        derive_usage(
            &mut usage,
            Some("gpt-4"),
            Some(&json!("hello")),
            Some(&json!("world")),
        );
        assert!(usage["input"] > 0.0);
        assert!(usage["output"] > 0.0);
        assert_eq!(usage["total"], usage["input"] + usage["output"]);
    }

    #[test]
    fn explicit_total_wins() {
        let mut usage = BTreeMap::from([
            ("input".to_string(), 3.0),
            ("output".to_string(), 4.0),
            ("total".to_string(), 99.0),
        ]);
        derive_usage(&mut usage, None, None, None);
        assert_eq!(usage["total"], 99.0);
    }

    #[test]
    fn no_model_means_no_derivation() {
        let mut usage = BTreeMap::new();
        derive_usage(&mut usage, None, Some(&json!("hello")), None);
        assert!(usage.is_empty());
    }
}
