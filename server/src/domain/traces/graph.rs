//! Agent-graph step assignment
//!
//! Reconstructs agent-graph steps for a trace's observations from three
//! signal sources, in priority order:
//!   1. explicit `graph_node_id` / `graph_parent_node_id` metadata
//!   2. legacy `langgraph_node` / `langgraph_step` metadata
//!   3. the observation type taxonomy (agent-ish types ordered by start)
//!
//! Steps are assigned by BFS from the roots, parents before children; each
//! node is visited at most once, so cycles terminate. Orphaned nodes are
//! roots at step 0. Traces with no graph signal return an empty result.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::data::types::ObservationRecord;

pub const METADATA_GRAPH_NODE_ID: &str = "graph_node_id";
pub const METADATA_GRAPH_PARENT_NODE_ID: &str = "graph_parent_node_id";
pub const METADATA_LANGGRAPH_NODE: &str = "langgraph_node";
pub const METADATA_LANGGRAPH_STEP: &str = "langgraph_step";

/// Observation types that participate in taxonomy-based graphs
const GRAPH_RELEVANT_TYPES: &[&str] = &["AGENT", "TOOL", "CHAIN", "RETRIEVER", "EMBEDDING"];

/// One observation's place in the agent graph
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentGraphEntry {
    /// Observation id
    pub id: String,
    /// Graph node label
    pub node: String,
    /// BFS depth from the roots
    pub step: u32,
}

fn metadata_str(observation: &ObservationRecord, key: &str) -> Option<String> {
    observation
        .metadata
        .as_ref()?
        .get(key)
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn metadata_number(observation: &ObservationRecord, key: &str) -> Option<f64> {
    let value = observation.metadata.as_ref()?.get(key)?;
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Compute the agent graph for one trace's observations.
pub fn get_agent_graph_data(observations: &[ObservationRecord]) -> Vec<AgentGraphEntry> {
    let explicit: Vec<(&ObservationRecord, String, Option<String>)> = observations
        .iter()
        .filter_map(|o| {
            metadata_str(o, METADATA_GRAPH_NODE_ID)
                .map(|node| (o, node, metadata_str(o, METADATA_GRAPH_PARENT_NODE_ID)))
        })
        .collect();
    if !explicit.is_empty() {
        return assign_by_edges(&explicit);
    }

    let legacy: Vec<(&ObservationRecord, String, Option<f64>)> = observations
        .iter()
        .filter_map(|o| {
            metadata_str(o, METADATA_LANGGRAPH_NODE)
                .map(|node| (o, node, metadata_number(o, METADATA_LANGGRAPH_STEP)))
        })
        .collect();
    if !legacy.is_empty() {
        return assign_legacy(&legacy);
    }

    let relevant: Vec<&ObservationRecord> = observations
        .iter()
        .filter(|o| GRAPH_RELEVANT_TYPES.contains(&o.observation_type.as_str()))
        .collect();
    if !relevant.is_empty() {
        return assign_by_taxonomy(&relevant);
    }

    Vec::new()
}

/// BFS over explicit parent edges. Node identity is the graph node id;
/// every observation carrying a node id receives that node's step.
fn assign_by_edges(
    entries: &[(&ObservationRecord, String, Option<String>)],
) -> Vec<AgentGraphEntry> {
    // Node insertion order follows observation start time.
    let mut ordered = entries.to_vec();
    ordered.sort_by_key(|(o, _, _)| o.start_time);

    let mut node_order: Vec<String> = Vec::new();
    let mut parent_of: HashMap<String, Option<String>> = HashMap::new();
    for (_, node, parent) in &ordered {
        if !parent_of.contains_key(node) {
            node_order.push(node.clone());
            parent_of.insert(node.clone(), parent.clone());
        }
    }

    let mut children_of: HashMap<String, Vec<String>> = HashMap::new();
    for node in &node_order {
        if let Some(Some(parent)) = parent_of.get(node)
            && parent != node
            && parent_of.contains_key(parent)
        {
            children_of.entry(parent.clone()).or_default().push(node.clone());
        }
    }

    let mut steps: HashMap<String, u32> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = VecDeque::new();

    // Roots: no parent, self-parent, or a parent that never appears.
    for node in &node_order {
        let is_root = match parent_of.get(node) {
            Some(Some(parent)) => parent == node || !parent_of.contains_key(parent),
            _ => true,
        };
        if is_root {
            steps.insert(node.clone(), 0);
            visited.insert(node.clone());
            queue.push_back(node.clone());
        }
    }

    loop {
        while let Some(current) = queue.pop_front() {
            let step = steps[&current];
            for child in children_of.get(&current).cloned().unwrap_or_default() {
                if visited.insert(child.clone()) {
                    steps.insert(child.clone(), step + 1);
                    queue.push_back(child);
                }
            }
        }
        // Cycle-only components: promote the earliest unvisited node to a
        // root so every node still receives a step.
        match node_order.iter().find(|node| !visited.contains(*node)) {
            Some(node) => {
                steps.insert(node.clone(), 0);
                visited.insert(node.clone());
                queue.push_back(node.clone());
            }
            None => break,
        }
    }

    ordered
        .iter()
        .map(|(observation, node, _)| AgentGraphEntry {
            id: observation.id.clone(),
            node: node.clone(),
            step: steps[node],
        })
        .collect()
}

/// Legacy langgraph metadata carries no edges: distinct nodes are ordered
/// by their explicit step (then start time) and re-numbered densely.
fn assign_legacy(entries: &[(&ObservationRecord, String, Option<f64>)]) -> Vec<AgentGraphEntry> {
    let mut ordered = entries.to_vec();
    ordered.sort_by(|(a, _, step_a), (b, _, step_b)| {
        let key_a = step_a.unwrap_or(f64::MAX);
        let key_b = step_b.unwrap_or(f64::MAX);
        key_a
            .partial_cmp(&key_b)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.start_time.cmp(&b.start_time))
    });

    let mut steps: HashMap<String, u32> = HashMap::new();
    let mut next = 0u32;
    for (_, node, _) in &ordered {
        if !steps.contains_key(node) {
            steps.insert(node.clone(), next);
            next += 1;
        }
    }

    ordered
        .iter()
        .map(|(observation, node, _)| AgentGraphEntry {
            id: observation.id.clone(),
            node: node.clone(),
            step: steps[node],
        })
        .collect()
}

/// Taxonomy fallback: graph-relevant observations ordered by start time;
/// the node label is the observation name (or its type when unnamed).
fn assign_by_taxonomy(observations: &[&ObservationRecord]) -> Vec<AgentGraphEntry> {
    let mut ordered = observations.to_vec();
    ordered.sort_by_key(|o| o.start_time);
    ordered
        .iter()
        .enumerate()
        .map(|(index, observation)| AgentGraphEntry {
            id: observation.id.clone(),
            node: observation
                .name
                .clone()
                .unwrap_or_else(|| observation.observation_type.clone()),
            step: index as u32,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn observation(
        id: &str,
        observation_type: &str,
        start_offset_ms: i64,
        metadata: Option<serde_json::Value>,
    ) -> ObservationRecord {
        ObservationRecord {
            id: id.to_string(),
            trace_id: Some("tr".to_string()),
            parent_observation_id: None,
            observation_type: observation_type.to_string(),
            name: Some(id.to_string()),
            level: "DEFAULT".to_string(),
            status_message: None,
            start_time: DateTime::from_timestamp_millis(1_700_000_000_000 + start_offset_ms)
                .unwrap(),
            end_time: None,
            completion_start_time: None,
            input: None,
            output: None,
            metadata,
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

    fn graph_meta(node: &str, parent: Option<&str>) -> serde_json::Value {
        match parent {
            Some(parent) => json!({
                METADATA_GRAPH_NODE_ID: node,
                METADATA_GRAPH_PARENT_NODE_ID: parent
            }),
            None => json!({ METADATA_GRAPH_NODE_ID: node }),
        }
    }

    #[test]
    fn explicit_chain_assigns_sequential_steps() {
        let observations = vec![
            observation("o1", "SPAN", 0, Some(graph_meta("start", None))),
            observation("o2", "SPAN", 100, Some(graph_meta("process", Some("start")))),
            observation("o3", "SPAN", 200, Some(graph_meta("end", Some("process")))),
        ];
        let graph = get_agent_graph_data(&observations);
        assert_eq!(
            graph,
            vec![
                AgentGraphEntry { id: "o1".into(), node: "start".into(), step: 0 },
                AgentGraphEntry { id: "o2".into(), node: "process".into(), step: 1 },
                AgentGraphEntry { id: "o3".into(), node: "end".into(), step: 2 },
            ]
        );
    }

    #[test]
    fn cycles_terminate_and_all_nodes_get_steps() {
        let observations = vec![
            observation("o1", "SPAN", 0, Some(graph_meta("a", Some("b")))),
            observation("o2", "SPAN", 100, Some(graph_meta("b", Some("a")))),
        ];
        let graph = get_agent_graph_data(&observations);
        assert_eq!(graph.len(), 2);
        for entry in &graph {
            assert!(entry.step <= 1);
        }
    }

    #[test]
    fn orphaned_parent_reference_is_a_root() {
        let observations = vec![
            observation("o1", "SPAN", 0, Some(graph_meta("lonely", Some("ghost")))),
        ];
        let graph = get_agent_graph_data(&observations);
        assert_eq!(graph[0].step, 0);
    }

    #[test]
    fn branching_assigns_bfs_depths() {
        let observations = vec![
            observation("o1", "SPAN", 0, Some(graph_meta("root", None))),
            observation("o2", "SPAN", 100, Some(graph_meta("left", Some("root")))),
            observation("o3", "SPAN", 200, Some(graph_meta("right", Some("root")))),
            observation("o4", "SPAN", 300, Some(graph_meta("leaf", Some("left")))),
        ];
        let steps: HashMap<String, u32> = get_agent_graph_data(&observations)
            .into_iter()
            .map(|e| (e.node, e.step))
            .collect();
        assert_eq!(steps["root"], 0);
        assert_eq!(steps["left"], 1);
        assert_eq!(steps["right"], 1);
        assert_eq!(steps["leaf"], 2);
    }

    #[test]
    fn explicit_signal_wins_over_legacy_and_taxonomy() {
        let observations = vec![
            observation("o1", "AGENT", 0, Some(graph_meta("only", None))),
            observation(
                "o2",
                "TOOL",
                100,
                Some(json!({ METADATA_LANGGRAPH_NODE: "legacy", METADATA_LANGGRAPH_STEP: 5 })),
            ),
        ];
        let graph = get_agent_graph_data(&observations);
        assert_eq!(graph.len(), 1);
        assert_eq!(graph[0].node, "only");
    }

    #[test]
    fn legacy_steps_order_nodes_densely() {
        let observations = vec![
            observation(
                "o1",
                "SPAN",
                0,
                Some(json!({ METADATA_LANGGRAPH_NODE: "late", METADATA_LANGGRAPH_STEP: 7 })),
            ),
            observation(
                "o2",
                "SPAN",
                100,
                Some(json!({ METADATA_LANGGRAPH_NODE: "early", METADATA_LANGGRAPH_STEP: 2 })),
            ),
        ];
        let graph = get_agent_graph_data(&observations);
        let steps: HashMap<String, u32> =
            graph.into_iter().map(|e| (e.node, e.step)).collect();
        assert_eq!(steps["early"], 0);
        assert_eq!(steps["late"], 1);
    }

    #[test]
    fn taxonomy_orders_graph_relevant_types_by_start() {
        let observations = vec![
            observation("gen", "GENERATION", 0, None),
            observation("tool", "TOOL", 200, None),
            observation("agent", "AGENT", 100, None),
        ];
        let graph = get_agent_graph_data(&observations);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph[0].node, "agent");
        assert_eq!(graph[0].step, 0);
        assert_eq!(graph[1].node, "tool");
        assert_eq!(graph[1].step, 1);
    }

    #[test]
    fn no_signal_returns_empty() {
        let observations = vec![
            observation("a", "SPAN", 0, None),
            observation("b", "GENERATION", 100, None),
        ];
        assert!(get_agent_graph_data(&observations).is_empty());
    }
}
