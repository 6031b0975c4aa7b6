//! Shared transactional row types (PostgreSQL)
//!
//! JSON-valued columns are stored as TEXT and parsed at the edges; rows
//! stay plain data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// Parse an optional TEXT column holding JSON; `None` stays `None`.
pub fn parse_json_column(raw: Option<&str>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(s).ok())
}

/// Encode an optional JSON value for a TEXT column.
pub fn encode_json_column(value: Option<&Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

// ============================================================================
// Observability entities
// ============================================================================

/// Trace row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TraceRow {
    pub id: String,
    pub project_id: String,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub metadata: Option<String>,
    pub release: Option<String>,
    pub version: Option<String>,
    /// JSON array of strings
    pub tags: Option<String>,
    pub public: bool,
    pub bookmarked: bool,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    /// Timestamp of the latest applied event (ordering for metadata merges)
    pub event_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Observation row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ObservationRow {
    pub id: String,
    pub project_id: String,
    pub trace_id: Option<String>,
    pub parent_observation_id: Option<String>,
    pub observation_type: String,
    pub name: Option<String>,
    pub level: String,
    pub status_message: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completion_start_time: Option<DateTime<Utc>>,
    pub input: Option<String>,
    pub output: Option<String>,
    pub metadata: Option<String>,
    pub model: Option<String>,
    pub model_parameters: Option<String>,
    /// JSON map of usage component -> count
    pub usage_details: Option<String>,
    /// JSON map of cost component -> USD
    pub cost_details: Option<String>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub unit: Option<String>,
    pub version: Option<String>,
    pub environment: String,
    pub prompt_id: Option<String>,
    pub event_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Score row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ScoreRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub source: String,
    pub data_type: String,
    pub value: Option<f64>,
    pub string_value: Option<String>,
    pub comment: Option<String>,
    pub metadata: Option<String>,
    pub config_id: Option<String>,
    pub author_user_id: Option<String>,
    pub queue_id: Option<String>,
    pub trace_id: Option<String>,
    pub session_id: Option<String>,
    pub dataset_run_id: Option<String>,
    pub observation_id: Option<String>,
    pub environment: String,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session row (upserted when traces reference a session)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
}

/// Prompt version row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PromptRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub version: i32,
    /// "text" or "chat"
    pub prompt_type: String,
    /// JSON-encoded body: a string for text prompts, a message array for chat
    pub prompt: String,
    pub config: Option<String>,
    /// JSON array of strings
    pub labels: Option<String>,
    /// JSON array of strings
    pub tags: Option<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Media asset row (content-addressed)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MediaRow {
    pub id: String,
    pub project_id: String,
    /// base64 of the raw 32-byte digest
    pub sha256_hash: String,
    pub content_type: String,
    pub content_length: i64,
    pub bucket_name: String,
    pub bucket_path: String,
    pub upload_http_status: Option<i32>,
    pub upload_http_error: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaRow {
    /// Uploaded means the report step confirmed a 2xx from the object store.
    pub fn is_uploaded(&self) -> bool {
        self.upload_http_status
            .is_some_and(|status| (200..300).contains(&status))
    }
}

// ============================================================================
// Admin entities
// ============================================================================

/// Organization row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrganizationRow {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Organization membership row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgMembershipRow {
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Project membership row (subordinate to an organization membership)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMembershipRow {
    pub project_id: String,
    pub user_id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API key scope: organization-wide or single-project
pub const API_KEY_SCOPE_ORGANIZATION: &str = "ORGANIZATION";
pub const API_KEY_SCOPE_PROJECT: &str = "PROJECT";

/// Access level granted by a project-scoped key
pub const ACCESS_LEVEL_ALL: &str = "all";
pub const ACCESS_LEVEL_SCORES_ONLY: &str = "scores-only";

/// API key row; the secret is stored only as an HMAC hash plus a display
/// fragment.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKeyRow {
    pub id: String,
    pub organization_id: String,
    /// NULL for organization-scoped keys
    pub project_id: Option<String>,
    pub scope: String,
    pub access_level: String,
    pub public_key: String,
    pub hashed_secret_key: String,
    pub display_secret_key: String,
    pub note: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_column_round_trip() {
        let value = json!({"a": [1, 2], "b": "x"});
        let encoded = encode_json_column(Some(&value)).unwrap();
        assert_eq!(parse_json_column(Some(&encoded)), Some(value));
        assert_eq!(parse_json_column(None), None);
        assert_eq!(parse_json_column(Some("not-json")), None);
    }

    #[test]
    fn media_uploaded_requires_2xx() {
        let mut row = MediaRow {
            id: "m".into(),
            project_id: "p".into(),
            sha256_hash: "h".into(),
            content_type: "image/png".into(),
            content_length: 10,
            bucket_name: "b".into(),
            bucket_path: "k".into(),
            upload_http_status: None,
            upload_http_error: None,
            uploaded_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!row.is_uploaded());
        row.upload_http_status = Some(200);
        assert!(row.is_uploaded());
        row.upload_http_status = Some(403);
        assert!(!row.is_uploaded());
    }
}
