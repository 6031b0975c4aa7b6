//! Prompt registry
//!
//! Versioned named templates. Version numbers are minted `max + 1` when
//! absent; the first version freezes the prompt type for its name; reads
//! without a version resolve the active version only.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::data::DataError;
use crate::data::TransactionalService;
use crate::data::transactional::repositories::prompt as prompt_repo;
use crate::data::types::PromptRow;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("{0}")]
    Validation(String),
    #[error("Prompt type {requested} conflicts with existing type {frozen} for this name")]
    TypeConflict { frozen: String, requested: String },
    #[error("Prompt not found")]
    NotFound,
    #[error(transparent)]
    Storage(#[from] DataError),
}

/// Prompt template kind; frozen per (project, name) by the first version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptType {
    Text,
    Chat,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Chat => "chat",
        }
    }
}

/// A chat prompt message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CreatePromptParams {
    pub name: String,
    pub version: Option<i32>,
    pub prompt_type: PromptType,
    /// A string for text prompts, an ordered message array for chat
    pub prompt: Value,
    pub config: Option<Value>,
    pub labels: Vec<String>,
    pub tags: Vec<String>,
    pub is_active: bool,
    pub created_by: Option<String>,
}

fn validate_body(prompt_type: PromptType, prompt: &Value) -> Result<(), PromptError> {
    match prompt_type {
        PromptType::Text => {
            if !prompt.is_string() {
                return Err(PromptError::Validation(
                    "text prompts require a string body".to_string(),
                ));
            }
        }
        PromptType::Chat => {
            let messages: Result<Vec<ChatMessage>, _> =
                serde_json::from_value(prompt.clone());
            if messages.map(|m| m.is_empty()).unwrap_or(true) {
                return Err(PromptError::Validation(
                    "chat prompts require a non-empty {role, content} array".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Create a prompt version.
pub async fn create_prompt(
    transactional: &TransactionalService,
    project_id: &str,
    params: CreatePromptParams,
) -> Result<PromptRow, PromptError> {
    if params.name.is_empty() {
        return Err(PromptError::Validation("prompt name is required".to_string()));
    }
    validate_body(params.prompt_type, &params.prompt)?;

    let pool = transactional.pool();

    // The first version of a name freezes its type.
    if let Some(frozen) = prompt_repo::prompt_type_of_name(pool, project_id, &params.name).await?
        && frozen != params.prompt_type.as_str()
    {
        return Err(PromptError::TypeConflict {
            frozen,
            requested: params.prompt_type.as_str().to_string(),
        });
    }

    let version = match params.version {
        Some(version) => {
            if version < 1 {
                return Err(PromptError::Validation("version must be >= 1".to_string()));
            }
            version
        }
        None => {
            prompt_repo::max_version(pool, project_id, &params.name)
                .await?
                .unwrap_or(0)
                + 1
        }
    };

    let now = Utc::now();
    let row = PromptRow {
        id: Uuid::new_v4().to_string(),
        project_id: project_id.to_string(),
        name: params.name,
        version,
        prompt_type: params.prompt_type.as_str().to_string(),
        prompt: params.prompt.to_string(),
        config: params.config.map(|c| c.to_string()),
        labels: serde_json::to_string(&params.labels).ok(),
        tags: serde_json::to_string(&params.tags).ok(),
        is_active: params.is_active,
        created_by: params.created_by,
        created_at: now,
        updated_at: now,
    };
    prompt_repo::insert_prompt(pool, &row).await?;
    Ok(row)
}

/// Resolve a prompt by name. Without a version only the active version is
/// returned; with a version, any stored version.
pub async fn get_prompt(
    transactional: &TransactionalService,
    project_id: &str,
    name: &str,
    version: Option<i32>,
) -> Result<Option<PromptRow>, DataError> {
    let pool = transactional.pool();
    match version {
        Some(version) => {
            prompt_repo::get_prompt_by_version(pool, project_id, name, version).await
        }
        None => prompt_repo::get_active_prompt(pool, project_id, name).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_prompts_require_string_bodies() {
        assert!(validate_body(PromptType::Text, &json!("Hello {{name}}")).is_ok());
        assert!(validate_body(PromptType::Text, &json!([{"role": "user"}])).is_err());
    }

    #[test]
    fn chat_prompts_require_message_arrays() {
        let messages = json!([
            {"role": "system", "content": "You are terse."},
            {"role": "user", "content": "{{question}}"}
        ]);
        assert!(validate_body(PromptType::Chat, &messages).is_ok());
        assert!(validate_body(PromptType::Chat, &json!([])).is_err());
        assert!(validate_body(PromptType::Chat, &json!("not chat")).is_err());
        assert!(validate_body(PromptType::Chat, &json!([{"role": "user"}])).is_err());
    }

    #[test]
    fn prompt_type_serde() {
        assert_eq!(
            serde_json::from_value::<PromptType>(json!("chat")).unwrap(),
            PromptType::Chat
        );
        assert_eq!(PromptType::Text.as_str(), "text");
    }
}
