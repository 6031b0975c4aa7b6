//! Trace reading: tree reconstruction and agent-graph step assignment

pub mod graph;
pub mod reader;

pub use graph::{AgentGraphEntry, get_agent_graph_data};
pub use reader::{
    ObservationNode, TraceDetail, flatten_observations, get_trace_by_id, nest_observations,
};
