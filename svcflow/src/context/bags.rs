//! Append-only pipeline context.

use crate::errors::ContextConflictError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Values a stage contributes to the context when it succeeds.
pub type ContextPatch = BTreeMap<String, serde_json::Value>;

/// The accumulated key/value state threading ids between stages.
///
/// Writing to an existing key raises a `ContextConflictError`. A context
/// is owned by exactly one pipeline run; stages only ever see it by
/// shared reference and hand back a [`ContextPatch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineContext {
    data: BTreeMap<String, serde_json::Value>,
}

impl PipelineContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a seed value, for building an initial context.
    ///
    /// # Errors
    ///
    /// Returns `ContextConflictError` if the key already exists.
    pub fn with_value(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self, ContextConflictError> {
        self.insert(key, value.into())?;
        Ok(self)
    }

    /// Gets a value from the context.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string value from the context.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Inserts a value.
    ///
    /// # Errors
    ///
    /// Returns `ContextConflictError` if the key already exists.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), ContextConflictError> {
        let key = key.into();
        if self.data.contains_key(&key) {
            return Err(ContextConflictError::new(key));
        }
        self.data.insert(key, value);
        Ok(())
    }

    /// Merges a patch, all or nothing.
    ///
    /// Returns the keys that were added, in key order.
    ///
    /// # Errors
    ///
    /// Returns `ContextConflictError` for the first key that already
    /// exists; the context is left untouched in that case.
    pub fn merge(&mut self, patch: ContextPatch) -> Result<Vec<String>, ContextConflictError> {
        if let Some(key) = patch.keys().find(|k| self.data.contains_key(*k)) {
            return Err(ContextConflictError::new(key.clone()));
        }
        let keys: Vec<String> = patch.keys().cloned().collect();
        self.data.extend(patch);
        Ok(keys)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the context is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns all keys, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Iterates over all entries, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.data.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Renders a context value as the text a remote API or a store expects.
///
/// Strings are returned verbatim; everything else as compact JSON.
#[must_use]
pub fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_insert_and_get() {
        let mut ctx = PipelineContext::new();
        ctx.insert("serviceId", json!("S1")).unwrap();

        assert_eq!(ctx.get("serviceId"), Some(&json!("S1")));
        assert_eq!(ctx.get_str("serviceId"), Some("S1"));
        assert!(ctx.contains_key("serviceId"));
        assert!(!ctx.contains_key("dataId"));
    }

    #[test]
    fn test_context_conflict() {
        let mut ctx = PipelineContext::new();
        ctx.insert("key", json!(1)).unwrap();

        let err = ctx.insert("key", json!(2)).unwrap_err();
        assert_eq!(err.key, "key");
        assert_eq!(ctx.get("key"), Some(&json!(1)));
    }

    #[test]
    fn test_merge_is_all_or_nothing() {
        let mut ctx = PipelineContext::new().with_value("b", "existing").unwrap();

        let mut patch = ContextPatch::new();
        patch.insert("a".to_string(), json!("new"));
        patch.insert("b".to_string(), json!("clobber"));

        let err = ctx.merge(patch).unwrap_err();
        assert_eq!(err.key, "b");
        assert!(!ctx.contains_key("a"));
        assert_eq!(ctx.get_str("b"), Some("existing"));
    }

    #[test]
    fn test_merge_returns_added_keys() {
        let mut ctx = PipelineContext::new();
        let mut patch = ContextPatch::new();
        patch.insert("reportId".to_string(), json!("R1"));
        patch.insert("dataId".to_string(), json!("D1"));

        let keys = ctx.merge(patch).unwrap();
        assert_eq!(keys, vec!["dataId".to_string(), "reportId".to_string()]);
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_context_serializes_as_plain_map() {
        let ctx = PipelineContext::new().with_value("serviceId", "S1").unwrap();
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"serviceId": "S1"}));
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("S1")), "S1");
        assert_eq!(value_to_text(&json!(42)), "42");
        assert_eq!(value_to_text(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
