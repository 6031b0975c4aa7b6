//! Trace reader
//!
//! Reads a trace with its observations and trace-level scores from the
//! analytical store and reconstructs the observation forest.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::data::AnalyticsService;
use crate::data::DataError;
use crate::data::analytics::repositories::{
    observation as observation_repo, score as score_repo, trace as trace_repo,
};
use crate::data::types::{ObservationRecord, ScoreRecord, TraceRecord};

/// An observation with its nested children
#[derive(Debug, Clone, Serialize)]
pub struct ObservationNode {
    #[serde(flatten)]
    pub observation: ObservationRecord,
    pub children: Vec<ObservationNode>,
}

/// A trace with nested observations and its scores
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDetail {
    #[serde(flatten)]
    pub trace: TraceRecord,
    pub observations: Vec<ObservationNode>,
    pub scores: Vec<ScoreRecord>,
}

/// Build the observation forest from a flat list.
///
/// Nodes whose parent is present become that parent's children; nodes
/// without a parent, or whose parent is absent from the list, become
/// roots. Siblings are ordered by start time.
pub fn nest_observations(flat: Vec<ObservationRecord>) -> Vec<ObservationNode> {
    let present: std::collections::HashSet<String> =
        flat.iter().map(|o| o.id.clone()).collect();

    let mut children_of: HashMap<String, Vec<ObservationRecord>> = HashMap::new();
    let mut roots: Vec<ObservationRecord> = Vec::new();
    for observation in flat {
        match observation.parent_observation_id.clone() {
            Some(parent) if parent != observation.id && present.contains(&parent) => {
                children_of.entry(parent).or_default().push(observation);
            }
            _ => roots.push(observation),
        }
    }

    fn build(
        observation: ObservationRecord,
        children_of: &mut HashMap<String, Vec<ObservationRecord>>,
    ) -> ObservationNode {
        let mut children: Vec<ObservationNode> = children_of
            .remove(&observation.id)
            .unwrap_or_default()
            .into_iter()
            .map(|child| build(child, children_of))
            .collect();
        children.sort_by_key(|node| node.observation.start_time);
        ObservationNode {
            observation,
            children,
        }
    }

    let mut forest: Vec<ObservationNode> = roots
        .into_iter()
        .map(|root| build(root, &mut children_of))
        .collect();
    forest.sort_by_key(|node| node.observation.start_time);
    forest
}

/// Flatten a forest back to records (children after parents).
pub fn flatten_observations(forest: Vec<ObservationNode>) -> Vec<ObservationRecord> {
    let mut flat = Vec::new();
    fn walk(node: ObservationNode, flat: &mut Vec<ObservationRecord>) {
        flat.push(node.observation);
        for child in node.children {
            walk(child, flat);
        }
    }
    for node in forest {
        walk(node, &mut flat);
    }
    flat
}

/// Read one trace with nested observations and scores. The timestamp hint
/// narrows the analytical-store scan to the trace's time partition.
pub async fn get_trace_by_id(
    analytics: &AnalyticsService,
    project_id: &str,
    trace_id: &str,
    timestamp_hint: Option<DateTime<Utc>>,
) -> Result<Option<TraceDetail>, DataError> {
    let Some(trace) =
        trace_repo::get_trace(analytics, project_id, trace_id, timestamp_hint).await?
    else {
        return Ok(None);
    };

    let observations =
        observation_repo::get_observations_for_trace(analytics, project_id, trace_id).await?;
    let scores = score_repo::get_scores_for_trace(analytics, project_id, trace_id).await?;

    Ok(Some(TraceDetail {
        trace,
        observations: nest_observations(observations),
        scores,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn observation(
        id: &str,
        parent: Option<&str>,
        start_offset_ms: i64,
    ) -> ObservationRecord {
        ObservationRecord {
            id: id.to_string(),
            trace_id: Some("tr".to_string()),
            parent_observation_id: parent.map(String::from),
            observation_type: "SPAN".to_string(),
            name: Some(id.to_string()),
            level: "DEFAULT".to_string(),
            status_message: None,
            start_time: DateTime::from_timestamp_millis(1_700_000_000_000 + start_offset_ms)
                .unwrap(),
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
            environment: "default".to_string(),
            prompt_id: None,
            latency_ms: None,
            time_to_first_token_ms: None,
            total_cost: None,
        }
    }

    #[test]
    fn nests_children_under_present_parents() {
        let flat = vec![
            observation("root", None, 0),
            observation("child-b", Some("root"), 200),
            observation("child-a", Some("root"), 100),
            observation("grandchild", Some("child-a"), 150),
        ];
        let forest = nest_observations(flat);
        assert_eq!(forest.len(), 1);
        let root = &forest[0];
        assert_eq!(root.observation.id, "root");
        // Siblings ordered by start time.
        assert_eq!(root.children[0].observation.id, "child-a");
        assert_eq!(root.children[1].observation.id, "child-b");
        assert_eq!(root.children[0].children[0].observation.id, "grandchild");
    }

    #[test]
    fn absent_parent_makes_a_root() {
        let flat = vec![
            observation("a", Some("missing"), 0),
            observation("b", None, 100),
        ];
        let forest = nest_observations(flat);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].observation.id, "a");
        assert_eq!(forest[1].observation.id, "b");
    }

    #[test]
    fn self_parent_becomes_root() {
        let flat = vec![observation("loop", Some("loop"), 0)];
        let forest = nest_observations(flat);
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
    }

    #[test]
    fn nest_flatten_round_trips() {
        let flat = vec![
            observation("root", None, 0),
            observation("a", Some("root"), 100),
            observation("b", Some("a"), 200),
            observation("c", Some("root"), 300),
        ];
        let ids = |records: &[ObservationRecord]| -> Vec<String> {
            let mut ids: Vec<String> = records.iter().map(|o| o.id.clone()).collect();
            ids.sort();
            ids
        };
        let original_ids = ids(&flat);
        let round_tripped = flatten_observations(nest_observations(flat));
        assert_eq!(ids(&round_tripped), original_ids);
        // Parents precede their children in flattened order.
        let position = |id: &str| {
            round_tripped
                .iter()
                .position(|o| o.id == id)
                .unwrap()
        };
        assert!(position("root") < position("a"));
        assert!(position("a") < position("b"));
    }
}
