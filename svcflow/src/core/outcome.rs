//! Per-attempt poll observations.

use super::StatusClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a single fetch of a remote resource revealed.
///
/// An absent status is recorded as the empty string, which no terminal
/// set lists and therefore classifies as pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// The status string found in the response.
    pub status: String,
    /// Extra fields found in the response, by field name.
    pub extracted: BTreeMap<String, String>,
}

impl Observation {
    /// Creates an observation with only a status.
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            extracted: BTreeMap::new(),
        }
    }

    /// Adds an extracted field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extracted.insert(name.into(), value.into());
        self
    }
}

/// The classified result of one poll attempt.
///
/// A poll loop keeps only the outcome of its last attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOutcome {
    /// The observed status.
    pub status: String,
    /// The attempt number (1-indexed).
    pub attempt: u32,
    /// Time since the loop started, in milliseconds.
    pub elapsed_ms: u64,
    /// Extra fields observed with the status.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted: BTreeMap<String, String>,
    /// How the status was classified.
    pub class: StatusClass,
}

impl PollOutcome {
    /// Builds an outcome from an observation.
    #[must_use]
    pub fn from_observation(
        observation: Observation,
        attempt: u32,
        elapsed_ms: u64,
        class: StatusClass,
    ) -> Self {
        Self {
            status: observation.status,
            attempt,
            elapsed_ms,
            extracted: observation.extracted,
            class,
        }
    }

    /// Returns an extracted field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.extracted.get(name).map(String::as_str)
    }
}
