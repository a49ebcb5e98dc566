//! Run reports.

use crate::context::PipelineContext;
use crate::core::{ResourceHandle, ResourceKind};
use crate::stages::StageOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Failure kind recorded when a poll budget runs out.
pub const TIMEOUT_KIND: &str = "timeout";

/// What happened to one stage during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    /// The stage name.
    pub name: String,
    /// The resource kind the stage handles.
    pub kind: ResourceKind,
    /// How the stage ended.
    pub outcome: StageOutcome,
    /// Wall time spent in the stage, in milliseconds.
    pub duration_ms: u64,
    /// Poll attempts made, for polling stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    /// The last status observed, for polling stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    /// The resource created, for creation stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<ResourceHandle>,
    /// The failure message, if the stage did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a record for a stage that was never reached.
    #[must_use]
    pub fn not_run(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            outcome: StageOutcome::NotRun,
            duration_ms: 0,
            attempts: None,
            last_status: None,
            handle: None,
            error: None,
        }
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    /// The stage that stopped the run.
    pub stage: String,
    /// A stable failure kind (`missing_input`, `remote_failure`, `timeout`, ...).
    pub kind: String,
    /// Human-readable description.
    pub message: String,
    /// The last remote status known for the resource, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    /// Poll attempts made before stopping, for polling stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl RunFailure {
    /// Returns true if the run stopped on an exhausted poll budget.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind == TIMEOUT_KIND
    }
}

/// The result of one pipeline run. Always produced, whatever happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique id of the run.
    pub run_id: Uuid,
    /// The pipeline name.
    pub pipeline: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
    /// Per-stage records, in pipeline order. Stages after a failure are
    /// recorded as not run.
    pub stages: Vec<StageRecord>,
    /// The context accumulated by the run.
    pub context: PipelineContext,
    /// Why the run stopped, if it did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl PipelineReport {
    /// Returns true if every stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Returns the stage that stopped the run.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.stage.as_str())
    }

    /// Returns the record for a stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.name == name)
    }

    /// Returns every resource created during the run, in creation order.
    pub fn handles(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.stages.iter().filter_map(|record| record.handle.as_ref())
    }

    /// Returns the run duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if a context value cannot be
    /// rendered.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
