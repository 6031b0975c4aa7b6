//! Append-only event log
//!
//! Every accepted ingestion event is written verbatim as a JSON blob keyed
//! `events/{projectId}/{entityType}/{entityId}/{eventId}.json`. Events that
//! exhaust their storage retries land in a parallel dead-letter prefix for
//! operator replay.

use std::sync::Arc;

use serde_json::Value;

use crate::data::DataError;
use crate::domain::events::EntityKind;

use super::storage::BlobStorage;

#[derive(Clone)]
pub struct EventLog {
    storage: Arc<dyn BlobStorage>,
}

impl EventLog {
    pub fn new(storage: Arc<dyn BlobStorage>) -> Self {
        Self { storage }
    }

    pub fn event_key(
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        event_id: &str,
    ) -> String {
        format!(
            "events/{}/{}/{}/{}.json",
            project_id,
            entity_kind.as_str(),
            entity_id,
            event_id
        )
    }

    pub fn dead_letter_key(
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        event_id: &str,
    ) -> String {
        format!(
            "dead-letter/{}/{}/{}/{}.json",
            project_id,
            entity_kind.as_str(),
            entity_id,
            event_id
        )
    }

    /// Write one accepted event.
    pub async fn append(
        &self,
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        event_id: &str,
        raw: &Value,
    ) -> Result<(), DataError> {
        let key = Self::event_key(project_id, entity_kind, entity_id, event_id);
        self.storage
            .put(&key, raw.to_string().into_bytes(), "application/json")
            .await
    }

    /// Record an event whose processing failed after retry exhaustion.
    pub async fn append_dead_letter(
        &self,
        project_id: &str,
        entity_kind: EntityKind,
        entity_id: &str,
        event_id: &str,
        raw: &Value,
        error: &str,
    ) -> Result<(), DataError> {
        let key = Self::dead_letter_key(project_id, entity_kind, entity_id, event_id);
        let payload = serde_json::json!({ "event": raw, "error": error });
        self.storage
            .put(&key, payload.to_string().into_bytes(), "application/json")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::blob::memory::MemoryBlobStorage;
    use serde_json::json;

    #[test]
    fn key_layout() {
        assert_eq!(
            EventLog::event_key("p1", EntityKind::Trace, "tr1", "evt1"),
            "events/p1/trace/tr1/evt1.json"
        );
        assert_eq!(
            EventLog::dead_letter_key("p1", EntityKind::Score, "s1", "evt2"),
            "dead-letter/p1/score/s1/evt2.json"
        );
    }

    #[tokio::test]
    async fn append_writes_raw_event() {
        let storage = Arc::new(MemoryBlobStorage::new("event-log"));
        let log = EventLog::new(storage.clone());
        let raw = json!({"id": "evt1", "type": "trace-create", "body": {"id": "tr1"}});
        log.append("p1", EntityKind::Trace, "tr1", "evt1", &raw)
            .await
            .unwrap();
        let stored = storage.object("events/p1/trace/tr1/evt1.json").unwrap();
        let parsed: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(parsed, raw);
    }

    #[tokio::test]
    async fn dead_letter_captures_error() {
        let storage = Arc::new(MemoryBlobStorage::new("event-log"));
        let log = EventLog::new(storage.clone());
        log.append_dead_letter(
            "p1",
            EntityKind::Observation,
            "o1",
            "evt9",
            &json!({"id": "evt9"}),
            "storage timeout",
        )
        .await
        .unwrap();
        let stored = storage
            .object("dead-letter/p1/observation/o1/evt9.json")
            .unwrap();
        let parsed: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(parsed["error"], "storage timeout");
    }
}
