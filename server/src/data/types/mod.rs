//! Shared data-layer types

pub mod analytics;
pub mod transactional;

pub use analytics::{
    ListObservationsParams, ListScoresParams, ListTracesParams, ObservationRecord, ScoreRecord,
    ScoreValueOperator, TraceRecord,
};
pub use transactional::{
    ACCESS_LEVEL_ALL, ACCESS_LEVEL_SCORES_ONLY, API_KEY_SCOPE_ORGANIZATION,
    API_KEY_SCOPE_PROJECT, ApiKeyRow, MediaRow, ObservationRow, OrgMembershipRow,
    OrganizationRow, ProjectMembershipRow, ProjectRow, PromptRow, ScoreRow, SessionRow, TraceRow,
    encode_json_column, parse_json_column,
};
