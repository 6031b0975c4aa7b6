//! Three-state optional for event body fields
//!
//! Event bodies distinguish absent (no change), explicit null (clear) and
//! present (write). `Option<T>` cannot represent all three, so bodies use
//! `Patch<T>` with `#[serde(default)]`.

use serde::{Deserialize, Deserializer};

/// A field patch from an event body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Patch<T> {
    /// Field absent from the body: leave the stored value unchanged
    #[default]
    Missing,
    /// Field explicitly null: clear the stored value
    Null,
    /// Field present: write this value
    Value(T),
}

impl<T> Patch<T> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Borrow the written value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Consume into the written value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Apply the patch to the current stored value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Self::Missing => current,
            Self::Null => None,
            Self::Value(v) => Some(v),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Patch<U> {
        match self {
            Self::Missing => Patch::Missing,
            Self::Null => Patch::Null,
            Self::Value(v) => Patch::Value(f(v)),
        }
    }

    pub fn as_ref(&self) -> Patch<&T> {
        match self {
            Self::Missing => Patch::Missing,
            Self::Null => Patch::Null,
            Self::Value(v) => Patch::Value(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(|opt| match opt {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default)]
        name: Patch<String>,
    }

    #[test]
    fn absent_field_is_missing() {
        let body: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(body.name, Patch::Missing);
    }

    #[test]
    fn null_field_is_null() {
        let body: Body = serde_json::from_str(r#"{"name": null}"#).unwrap();
        assert_eq!(body.name, Patch::Null);
    }

    #[test]
    fn present_field_is_value() {
        let body: Body = serde_json::from_str(r#"{"name": "run"}"#).unwrap();
        assert_eq!(body.name, Patch::Value("run".to_string()));
    }

    #[test]
    fn apply_semantics() {
        let current = Some("old".to_string());
        assert_eq!(Patch::Missing.apply(current.clone()), current);
        assert_eq!(Patch::<String>::Null.apply(current.clone()), None);
        assert_eq!(
            Patch::Value("new".to_string()).apply(current),
            Some("new".to_string())
        );
    }
}
