//! Resource kinds and status classification.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The kind of remote resource a stage creates or observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A logical AI service.
    Service,
    /// A dataset registered against a service.
    Dataset,
    /// A feature-engineering (data preparation) report.
    Report,
    /// A training experiment.
    Experiment,
    /// A deployment of a trained artifact.
    Deployment,
    /// An object-storage location holding source data.
    Storage,
    /// A server-side feature flag.
    FeatureFlag,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Dataset => write!(f, "dataset"),
            Self::Report => write!(f, "report"),
            Self::Experiment => write!(f, "experiment"),
            Self::Deployment => write!(f, "deployment"),
            Self::Storage => write!(f, "storage"),
            Self::FeatureFlag => write!(f, "feature_flag"),
        }
    }
}

/// How a polled status string is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// The resource reached a successful terminal state.
    Success,
    /// The resource reached a failed terminal state.
    Failure,
    /// The resource is still working; poll again.
    Pending,
}

impl StatusClass {
    /// Returns true if the class ends a poll loop.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// Classification of status strings for one resource kind.
///
/// Statuses are compared exactly. Anything not listed is `Pending`.
/// A success status only counts once every required field has been
/// extracted with a non-empty value; until then it is `Pending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalStateSet {
    success: BTreeSet<String>,
    failure: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    required_on_success: BTreeSet<String>,
}

impl TerminalStateSet {
    /// Creates an empty set; every status is pending.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a success status.
    #[must_use]
    pub fn success(mut self, status: impl Into<String>) -> Self {
        self.success.insert(status.into());
        self
    }

    /// Adds a failure status.
    #[must_use]
    pub fn failure(mut self, status: impl Into<String>) -> Self {
        self.failure.insert(status.into());
        self
    }

    /// Requires a field to be present before a success status is accepted.
    #[must_use]
    pub fn requiring(mut self, field: impl Into<String>) -> Self {
        self.required_on_success.insert(field.into());
        self
    }

    /// Fields that must be extracted alongside a success status.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.required_on_success.iter().map(String::as_str)
    }

    /// Classifies a status, given the fields extracted with it.
    #[must_use]
    pub fn classify(&self, status: &str, extracted: &BTreeMap<String, String>) -> StatusClass {
        if self.failure.contains(status) {
            return StatusClass::Failure;
        }
        if self.success.contains(status) {
            let complete = self
                .required_on_success
                .iter()
                .all(|field| extracted.get(field).is_some_and(|v| !v.is_empty()));
            if complete {
                return StatusClass::Success;
            }
        }
        StatusClass::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> TerminalStateSet {
        TerminalStateSet::new().success("Completed").failure("Failed")
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Service.to_string(), "service");
        assert_eq!(ResourceKind::Experiment.to_string(), "experiment");
        assert_eq!(ResourceKind::Deployment.to_string(), "deployment");
    }

    #[test]
    fn test_resource_kind_serialize() {
        let json = serde_json::to_string(&ResourceKind::Dataset).unwrap();
        assert_eq!(json, r#""dataset""#);
    }

    #[test]
    fn test_classify_terminal_states() {
        let set = deployment();
        let none = BTreeMap::new();

        assert_eq!(set.classify("Completed", &none), StatusClass::Success);
        assert_eq!(set.classify("Failed", &none), StatusClass::Failure);
        assert_eq!(set.classify("Pending", &none), StatusClass::Pending);
        assert_eq!(set.classify("", &none), StatusClass::Pending);
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        let set = deployment();
        assert_eq!(set.classify("completed", &BTreeMap::new()), StatusClass::Pending);
    }

    #[test]
    fn test_success_waits_for_required_field() {
        let set = deployment().requiring("dep_id");
        let mut extracted = BTreeMap::new();

        assert_eq!(set.classify("Completed", &extracted), StatusClass::Pending);

        extracted.insert("dep_id".to_string(), String::new());
        assert_eq!(set.classify("Completed", &extracted), StatusClass::Pending);

        extracted.insert("dep_id".to_string(), "D1".to_string());
        assert_eq!(set.classify("Completed", &extracted), StatusClass::Success);
    }

    #[test]
    fn test_failure_ignores_required_fields() {
        let set = deployment().requiring("dep_id");
        assert_eq!(set.classify("Failed", &BTreeMap::new()), StatusClass::Failure);
    }

    #[test]
    fn test_status_class_is_terminal() {
        assert!(StatusClass::Success.is_terminal());
        assert!(StatusClass::Failure.is_terminal());
        assert!(!StatusClass::Pending.is_terminal());
    }
}
