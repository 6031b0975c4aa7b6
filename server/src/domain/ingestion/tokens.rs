//! Model-aware token counting
//!
//! Fills in missing usage numbers for generation payloads when the event
//! names a model. Encoders are cached per model family since construction
//! is expensive.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use std::sync::LazyLock;
use tiktoken_rs::{CoreBPE, cl100k_base, o200k_base};

/// Encoder families we distinguish; everything unknown falls back to
/// cl100k, which matches modern chat models closely enough for estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Encoder {
    O200k,
    Cl100k,
}

fn encoder_for_model(model: &str) -> Encoder {
    let model = model.to_lowercase();
    if model.starts_with("gpt-4o")
        || model.starts_with("gpt-4.1")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
    {
        Encoder::O200k
    } else {
        Encoder::Cl100k
    }
}

static ENCODERS: LazyLock<DashMap<Encoder, Arc<CoreBPE>>> = LazyLock::new(DashMap::new);

fn bpe(encoder: Encoder) -> Option<Arc<CoreBPE>> {
    if let Some(cached) = ENCODERS.get(&encoder) {
        return Some(Arc::clone(&cached));
    }
    let built = match encoder {
        Encoder::O200k => o200k_base(),
        Encoder::Cl100k => cl100k_base(),
    };
    match built {
        Ok(bpe) => {
            let bpe = Arc::new(bpe);
            ENCODERS.insert(encoder, Arc::clone(&bpe));
            Some(bpe)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build tokenizer");
            None
        }
    }
}

/// Render a payload the way it would be sent to a model: strings verbatim,
/// everything else as compact JSON.
fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Count tokens of a payload for the given model. Returns `None` when no
/// tokenizer is available.
pub fn count_tokens(model: &str, payload: &Value) -> Option<u64> {
    if payload.is_null() {
        return None;
    }
    let bpe = bpe(encoder_for_model(model))?;
    let text = payload_text(payload);
    Some(bpe.encode_with_special_tokens(&text).len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn counts_are_positive_for_text() {
        let count = count_tokens("gpt-4", &json!("hello world")).unwrap();
        assert!(count > 0);
    }

    #[test]
    fn json_payloads_are_serialized() {
        let count = count_tokens("gpt-4", &json!({"role": "user", "content": "hi"})).unwrap();
        assert!(count > 2);
    }

    #[test]
    fn null_payload_yields_none() {
        assert_eq!(count_tokens("gpt-4", &Value::Null), None);
    }

    #[test]
    fn model_families_map_to_encoders() {
        assert_eq!(encoder_for_model("gpt-4o-mini"), Encoder::O200k);
        assert_eq!(encoder_for_model("o1-preview"), Encoder::O200k);
        assert_eq!(encoder_for_model("gpt-4"), Encoder::Cl100k);
        assert_eq!(encoder_for_model("claude-3-opus"), Encoder::Cl100k);
    }

    #[test]
    fn unknown_model_still_counts() {
        assert!(count_tokens("some-custom-model", &json!("text")).is_some());
    }
}
