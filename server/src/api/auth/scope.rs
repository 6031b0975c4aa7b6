//! Access scopes
//!
//! A credential resolves to a scope: the organization it belongs to, the
//! project it is pinned to (project keys only) and its access level.

use serde::Serialize;

use crate::data::types::{
    ACCESS_LEVEL_ALL, ACCESS_LEVEL_SCORES_ONLY, API_KEY_SCOPE_ORGANIZATION, ApiKeyRow,
};

/// What a key may do within its project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    All,
    ScoresOnly,
    None,
}

impl AccessLevel {
    pub fn parse(s: &str) -> Self {
        match s {
            ACCESS_LEVEL_ALL => Self::All,
            ACCESS_LEVEL_SCORES_ONLY => Self::ScoresOnly,
            _ => Self::None,
        }
    }
}

/// The authorization context derived from a credential
#[derive(Debug, Clone)]
pub struct AccessScope {
    pub org_id: String,
    /// None for organization-scoped keys
    pub project_id: Option<String>,
    pub access_level: AccessLevel,
    pub api_key_id: String,
}

impl AccessScope {
    pub fn from_key(row: &ApiKeyRow) -> Self {
        let access_level = if row.scope == API_KEY_SCOPE_ORGANIZATION {
            AccessLevel::All
        } else {
            AccessLevel::parse(&row.access_level)
        };
        Self {
            org_id: row.organization_id.clone(),
            project_id: row.project_id.clone(),
            access_level,
            api_key_id: row.id.clone(),
        }
    }

    pub fn is_organization_scoped(&self) -> bool {
        self.project_id.is_none()
    }

    /// The project this scope operates on; organization keys have none.
    pub fn require_project(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn key(scope: &str, project_id: Option<&str>, access_level: &str) -> ApiKeyRow {
        ApiKeyRow {
            id: "key-1".into(),
            organization_id: "org-1".into(),
            project_id: project_id.map(String::from),
            scope: scope.into(),
            access_level: access_level.into(),
            public_key: "pk-lt-x".into(),
            hashed_secret_key: "hash".into(),
            display_secret_key: "sk-lt-...x".into(),
            note: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn project_key_scope() {
        let scope = AccessScope::from_key(&key("PROJECT", Some("proj-1"), "all"));
        assert_eq!(scope.require_project(), Some("proj-1"));
        assert_eq!(scope.access_level, AccessLevel::All);
        assert!(!scope.is_organization_scoped());
    }

    #[test]
    fn scores_only_key() {
        let scope = AccessScope::from_key(&key("PROJECT", Some("proj-1"), "scores-only"));
        assert_eq!(scope.access_level, AccessLevel::ScoresOnly);
    }

    #[test]
    fn organization_key_has_no_project() {
        let scope = AccessScope::from_key(&key("ORGANIZATION", None, "all"));
        assert!(scope.is_organization_scoped());
        assert_eq!(scope.require_project(), None);
    }

    #[test]
    fn unknown_access_level_is_none() {
        let scope = AccessScope::from_key(&key("PROJECT", Some("p"), "mystery"));
        assert_eq!(scope.access_level, AccessLevel::None);
    }
}
