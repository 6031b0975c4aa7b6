//! Trace processor
//!
//! Merges a `trace-create` command into the stored row: metadata deep-
//! merges ordered by event timestamp, scalars follow the three-state patch
//! rules (absent keeps, null clears, present writes).

use chrono::{DateTime, Utc};

use crate::data::analytics::repositories::trace as analytics_trace;
use crate::data::transactional::repositories::trace as trace_repo;
use crate::data::types::{TraceRow, encode_json_column, parse_json_column};
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::events::{Patch, TraceCommand};
use crate::utils::json::merge_metadata;

use super::super::error::IngestionError;

/// Merge metadata honoring event-timestamp order: a late-arriving older
/// event becomes the base, not the patch.
pub fn merge_metadata_ordered(
    stored: Option<&serde_json::Value>,
    stored_event_ts: DateTime<Utc>,
    incoming: Option<&serde_json::Value>,
    incoming_event_ts: DateTime<Utc>,
) -> Option<serde_json::Value> {
    if incoming_event_ts >= stored_event_ts {
        merge_metadata(stored, incoming)
    } else {
        merge_metadata(incoming, stored)
    }
}

fn normalize_tags(mut tags: Vec<String>) -> Vec<String> {
    tags.sort();
    tags.dedup();
    tags
}

/// Apply one trace command; writes the merged row to both stores.
pub async fn process_trace(
    transactional: &TransactionalService,
    analytics: &AnalyticsService,
    project_id: &str,
    command: &TraceCommand,
    event_ts: DateTime<Utc>,
) -> Result<(), IngestionError> {
    let pool = transactional.pool();

    // Session rows are upserted first so the trace can reference them.
    if let Patch::Value(session_id) = &command.body.session_id {
        trace_repo::upsert_session(pool, project_id, session_id).await?;
    }

    let existing = trace_repo::get_trace(pool, project_id, &command.trace_id).await?;
    let now = Utc::now();
    let body = &command.body;

    let row = match existing {
        Some(stored) => {
            let stored_metadata = parse_json_column(stored.metadata.as_deref());
            let metadata = merge_metadata_ordered(
                stored_metadata.as_ref(),
                stored.event_ts,
                body.metadata.as_ref(),
                event_ts,
            );
            let stored_tags: Option<Vec<String>> = stored
                .tags
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok());
            let tags = body
                .tags
                .clone()
                .map(normalize_tags)
                .apply(stored_tags);

            TraceRow {
                id: stored.id,
                project_id: stored.project_id,
                name: body.name.clone().apply(stored.name),
                user_id: body.user_id.clone().apply(stored.user_id),
                session_id: body.session_id.clone().apply(stored.session_id),
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
                release: body.release.clone().apply(stored.release),
                version: body.version.clone().apply(stored.version),
                tags: tags.map(|t| serde_json::to_string(&t).unwrap_or_default()),
                public: body.public.clone().apply(Some(stored.public)).unwrap_or(false),
                bookmarked: stored.bookmarked,
                environment: command.environment.clone(),
                timestamp: body.timestamp.unwrap_or(stored.timestamp),
                event_ts: stored.event_ts.max(event_ts),
                created_at: stored.created_at,
                updated_at: now,
            }
        }
        None => TraceRow {
            id: command.trace_id.clone(),
            project_id: project_id.to_string(),
            name: body.name.clone().into_value(),
            user_id: body.user_id.clone().into_value(),
            session_id: body.session_id.clone().into_value(),
            input: body.input.value().map(|v| v.to_string()),
            output: body.output.value().map(|v| v.to_string()),
            metadata: encode_json_column(body.metadata.as_ref()),
            release: body.release.clone().into_value(),
            version: body.version.clone().into_value(),
            tags: body
                .tags
                .clone()
                .map(normalize_tags)
                .into_value()
                .map(|t| serde_json::to_string(&t).unwrap_or_default()),
            public: body.public.clone().into_value().unwrap_or(false),
            bookmarked: false,
            environment: command.environment.clone(),
            timestamp: body.timestamp.unwrap_or(event_ts),
            event_ts,
            created_at: now,
            updated_at: now,
        },
    };

    trace_repo::upsert_trace(pool, &row).await?;
    analytics_trace::insert_trace(analytics, &row).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ordered_merge_respects_event_timestamps() {
        let early = json!({"step": 1, "status": "started"});
        let late = json!({"step": 2, "error": ""});
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);

        // In-order arrival: late patch wins key-wise.
        let merged = merge_metadata_ordered(Some(&early), t0, Some(&late), t1).unwrap();
        assert_eq!(merged, json!({"step": 2, "status": "started", "error": ""}));

        // Out-of-order arrival: stored state is the newer event, the
        // incoming older event merges underneath it.
        let merged = merge_metadata_ordered(Some(&late), t1, Some(&early), t0).unwrap();
        assert_eq!(merged, json!({"step": 2, "status": "started", "error": ""}));
    }

    #[test]
    fn tags_are_sorted_and_deduped() {
        assert_eq!(
            normalize_tags(vec!["b".into(), "a".into(), "b".into()]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
