//! Ingestion orchestrator
//!
//! Fans a validated batch out across entities while serializing events that
//! target the same entity, collects per-event results for the 207 response,
//! and preserves accepted events in the append-only event log. Failures
//! after retry exhaustion go to the dead-letter log.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::core::constants::{INGESTION_LOCK_SHARDS, INGESTION_MAX_CONCURRENCY};
use crate::data::blob::EventLog;
use crate::data::{AnalyticsService, TransactionalService};
use crate::domain::events::{Command, ParsedEvent, parse_event};
use crate::utils::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, retry_with_backoff};

use super::error::IngestionError;
use super::keyed::{EntityKey, KeyedLocks};
use super::processors::{observation, score, sdk_log, trace};

/// Per-event success entry in the 207 response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSuccess {
    pub id: String,
    pub status: u16,
}

/// Per-event failure entry in the 207 response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFailure {
    pub id: String,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The multi-status outcome of one batch
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionOutcome {
    pub successes: Vec<EventSuccess>,
    pub errors: Vec<EventFailure>,
}

pub struct IngestionOrchestrator {
    transactional: Arc<TransactionalService>,
    analytics: Arc<AnalyticsService>,
    event_log: Option<EventLog>,
    locks: KeyedLocks,
    deadline: Duration,
}

impl IngestionOrchestrator {
    pub fn new(
        transactional: Arc<TransactionalService>,
        analytics: Arc<AnalyticsService>,
        event_log: Option<EventLog>,
        deadline: Duration,
    ) -> Self {
        Self {
            transactional,
            analytics,
            event_log,
            locks: KeyedLocks::new(INGESTION_LOCK_SHARDS),
            deadline,
        }
    }

    /// Process one batch. Envelope-level problems are the caller's concern;
    /// everything here is per-event. `scores_only` scopes score-only keys:
    /// non-score events fail per-event with 403.
    pub async fn process_batch(
        &self,
        project_id: &str,
        batch: Vec<Value>,
        scores_only: bool,
    ) -> IngestionOutcome {
        let mut outcome = IngestionOutcome::default();

        // Validate each item independently; a bad event never fails the batch.
        let mut groups: Vec<(EntityKey, Vec<ParsedEvent>)> = Vec::new();
        let mut group_index: HashMap<EntityKey, usize> = HashMap::new();
        for raw in batch {
            let fallback_id = raw
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            match parse_event(raw) {
                Ok(parsed) => {
                    if scores_only
                        && !matches!(
                            parsed.command,
                            Command::UpsertScore(_) | Command::SdkLog(_)
                        )
                    {
                        outcome.errors.push(EventFailure {
                            id: parsed.event_id,
                            status: 403,
                            message: "API key allows score events only".to_string(),
                            error: None,
                        });
                        continue;
                    }
                    let key = EntityKey {
                        project_id: project_id.to_string(),
                        kind: parsed.command.entity_kind(),
                        entity_id: parsed
                            .command
                            .entity_id()
                            .unwrap_or(&parsed.event_id)
                            .to_string(),
                    };
                    match group_index.get(&key) {
                        Some(&index) => groups[index].1.push(parsed),
                        None => {
                            group_index.insert(key.clone(), groups.len());
                            groups.push((key, vec![parsed]));
                        }
                    }
                }
                Err(e) => outcome.errors.push(EventFailure {
                    id: fallback_id,
                    status: 400,
                    message: e.to_string(),
                    error: None,
                }),
            }
        }

        let deadline = Instant::now() + self.deadline;

        // Entities proceed in parallel; events within one entity apply in
        // array order under the entity's lock.
        let results: Vec<IngestionOutcome> = futures::stream::iter(
            groups
                .into_iter()
                .map(|(key, events)| self.process_group(key, events, deadline)),
        )
        .buffer_unordered(INGESTION_MAX_CONCURRENCY)
        .collect()
        .await;

        for mut group_outcome in results {
            outcome.successes.append(&mut group_outcome.successes);
            outcome.errors.append(&mut group_outcome.errors);
        }
        outcome
    }

    async fn process_group(
        &self,
        key: EntityKey,
        events: Vec<ParsedEvent>,
        deadline: Instant,
    ) -> IngestionOutcome {
        let mut outcome = IngestionOutcome::default();
        let _guard = self.locks.acquire(&key).await;

        for event in events {
            if Instant::now() >= deadline {
                // Already-processed events stay durable; the rest are
                // reported as retryable timeouts.
                outcome.errors.push(EventFailure {
                    id: event.event_id,
                    status: IngestionError::Timeout.status(),
                    message: IngestionError::Timeout.to_string(),
                    error: None,
                });
                continue;
            }

            match self.process_event(&key, &event).await {
                Ok(()) => {
                    self.append_event_log(&key, &event);
                    outcome.successes.push(EventSuccess {
                        id: event.event_id,
                        status: 201,
                    });
                }
                Err(e) => {
                    if matches!(e, IngestionError::Storage(_)) {
                        self.append_dead_letter(&key, &event, &e);
                    }
                    tracing::debug!(
                        event_id = %event.event_id,
                        error = %e,
                        "Event processing failed"
                    );
                    outcome.errors.push(EventFailure {
                        id: event.event_id,
                        status: e.status(),
                        message: e.to_string(),
                        error: None,
                    });
                }
            }
        }
        outcome
    }

    /// Run one event's processor with bounded backoff on transient storage
    /// errors. Processors are idempotent upserts, so re-running is safe.
    async fn process_event(
        &self,
        key: &EntityKey,
        event: &ParsedEvent,
    ) -> Result<(), IngestionError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self.dispatch(key, event).await;
            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < DEFAULT_MAX_ATTEMPTS => {
                    let delay =
                        Duration::from_millis(DEFAULT_BASE_DELAY_MS * 2_u64.pow(attempt - 1));
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Retrying event after transient storage error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn dispatch(&self, key: &EntityKey, event: &ParsedEvent) -> Result<(), IngestionError> {
        match &event.command {
            Command::UpsertTrace(command) => {
                trace::process_trace(
                    &self.transactional,
                    &self.analytics,
                    &key.project_id,
                    command,
                    event.timestamp,
                )
                .await
            }
            Command::UpsertObservation(command) => {
                observation::process_observation(
                    &self.transactional,
                    &self.analytics,
                    &key.project_id,
                    command,
                    event.timestamp,
                )
                .await
            }
            Command::UpsertScore(command) => {
                score::process_score(
                    &self.transactional,
                    &self.analytics,
                    &key.project_id,
                    command,
                )
                .await
            }
            Command::SdkLog(command) => {
                sdk_log::process_sdk_log(&key.project_id, command);
                Ok(())
            }
        }
    }

    /// Event-log writes are fire-and-forget with bounded retry; they never
    /// delay the 207 response.
    fn append_event_log(&self, key: &EntityKey, event: &ParsedEvent) {
        let Some(event_log) = self.event_log.clone() else {
            return;
        };
        let key = key.clone();
        let event_id = event.event_id.clone();
        let raw = event.raw.clone();
        tokio::spawn(async move {
            let result = retry_with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY_MS, || {
                event_log.append(&key.project_id, key.kind, &key.entity_id, &event_id, &raw)
            })
            .await;
            if let Err((e, attempts)) = result {
                tracing::error!(
                    event_id = %event_id,
                    error = %e,
                    attempts,
                    "Event log write failed after retries"
                );
            }
        });
    }

    fn append_dead_letter(&self, key: &EntityKey, event: &ParsedEvent, error: &IngestionError) {
        let Some(event_log) = self.event_log.clone() else {
            return;
        };
        let key = key.clone();
        let event_id = event.event_id.clone();
        let raw = event.raw.clone();
        let error = error.to_string();
        tokio::spawn(async move {
            if let Err(e) = event_log
                .append_dead_letter(
                    &key.project_id,
                    key.kind,
                    &key.entity_id,
                    &event_id,
                    &raw,
                    &error,
                )
                .await
            {
                tracing::error!(event_id = %event_id, error = %e, "Dead-letter write failed");
            }
        });
    }
}
