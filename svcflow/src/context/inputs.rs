//! Declared stage inputs.

use super::PipelineContext;
use crate::errors::FailureReason;
use std::collections::BTreeMap;

/// The subset of a context a stage declared it needs.
///
/// Resolution fails on the first declared key that is absent (or null),
/// before the stage issues any remote call. Undeclared keys are never
/// visible to the stage.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    values: BTreeMap<String, serde_json::Value>,
}

impl StageInputs {
    /// Resolves declared keys from a context.
    ///
    /// # Errors
    ///
    /// Returns `FailureReason::MissingInput` naming the first key, in
    /// declaration order, that is absent or null.
    pub fn resolve<'a>(
        context: &PipelineContext,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, FailureReason> {
        let mut values = BTreeMap::new();
        for key in declared {
            match context.get(key) {
                Some(value) if !value.is_null() => {
                    values.insert(key.to_string(), value.clone());
                }
                _ => return Err(FailureReason::missing_input(key)),
            }
        }
        Ok(Self { values })
    }

    /// Gets a resolved value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.values.get(key)
    }

    /// Checks if a key was resolved.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the number of resolved inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the stage declared no inputs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_context() -> PipelineContext {
        PipelineContext::new()
            .with_value("serviceId", "S1")
            .unwrap()
            .with_value("dataId", "D1")
            .unwrap()
            .with_value("nothing", serde_json::Value::Null)
            .unwrap()
    }

    #[test]
    fn test_resolve_declared_keys() {
        let inputs = StageInputs::resolve(&sample_context(), ["serviceId"]).unwrap();

        assert_eq!(inputs.get("serviceId"), Some(&json!("S1")));
        assert!(!inputs.contains("dataId"));
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_missing_key_fails() {
        let err = StageInputs::resolve(&sample_context(), ["serviceId", "reportId"]).unwrap_err();
        assert_eq!(err, FailureReason::missing_input("reportId"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = StageInputs::resolve(&sample_context(), ["nothing"]).unwrap_err();
        assert_eq!(err, FailureReason::missing_input("nothing"));
    }

    #[test]
    fn test_first_missing_key_reported() {
        let err = StageInputs::resolve(&PipelineContext::new(), ["a", "b"]).unwrap_err();
        assert_eq!(err, FailureReason::missing_input("a"));
    }

    #[test]
    fn test_no_declared_inputs() {
        let inputs = StageInputs::resolve(&sample_context(), []).unwrap();
        assert!(inputs.is_empty());
    }
}
