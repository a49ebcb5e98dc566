//! Stage results.

use crate::context::ContextPatch;
use crate::core::{PollOutcome, ResourceHandle};
use crate::errors::FailureReason;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a successful stage hands back to the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Keys to add to the context.
    pub patch: ContextPatch,
    /// The resource a creation stage produced.
    pub handle: Option<ResourceHandle>,
    /// The terminal outcome a polling stage observed.
    pub poll: Option<PollOutcome>,
}

impl StageOutput {
    /// Creates an empty output.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a context value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.patch.insert(key.into(), value.into());
        self
    }

    /// Sets the created resource.
    #[must_use]
    pub fn with_handle(mut self, handle: ResourceHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Sets the poll outcome.
    #[must_use]
    pub fn with_poll(mut self, outcome: PollOutcome) -> Self {
        self.poll = Some(outcome);
        self
    }
}

/// The outcome of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    /// The stage succeeded.
    Ok(StageOutput),
    /// The stage failed.
    Failed(FailureReason),
    /// A polling stage ran out of attempts while the resource was pending.
    TimedOut(PollOutcome),
}

impl StageResult {
    /// Returns true for `Ok`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns the outcome label used in reports and events.
    #[must_use]
    pub fn outcome(&self) -> StageOutcome {
        match self {
            Self::Ok(_) => StageOutcome::Succeeded,
            Self::Failed(_) => StageOutcome::Failed,
            Self::TimedOut(_) => StageOutcome::TimedOut,
        }
    }

    /// Returns the last observed poll outcome, if any.
    #[must_use]
    pub fn poll_outcome(&self) -> Option<&PollOutcome> {
        match self {
            Self::Ok(output) => output.poll.as_ref(),
            Self::TimedOut(last) => Some(last),
            Self::Failed(_) => None,
        }
    }
}

impl From<FailureReason> for StageResult {
    fn from(reason: FailureReason) -> Self {
        Self::Failed(reason)
    }
}

/// How a stage ended, as recorded in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage succeeded.
    Succeeded,
    /// The stage failed.
    Failed,
    /// The stage's poll budget ran out.
    TimedOut,
    /// The stage was not reached because an earlier stage stopped the run.
    NotRun,
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::NotRun => write!(f, "not_run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Observation, ResourceKind, StatusClass};

    #[test]
    fn test_stage_output_builder() {
        let output = StageOutput::new()
            .with_value("serviceId", "S1")
            .with_handle(ResourceHandle::new("S1", ResourceKind::Service));

        assert_eq!(output.patch.get("serviceId"), Some(&serde_json::json!("S1")));
        assert_eq!(output.handle.unwrap().kind, ResourceKind::Service);
        assert!(output.poll.is_none());
    }

    #[test]
    fn test_outcome_labels() {
        let last = PollOutcome::from_observation(Observation::status("Pending"), 1, 0, StatusClass::Pending);

        assert_eq!(StageResult::Ok(StageOutput::new()).outcome(), StageOutcome::Succeeded);
        assert_eq!(
            StageResult::from(FailureReason::missing_input("x")).outcome(),
            StageOutcome::Failed
        );
        assert_eq!(StageResult::TimedOut(last.clone()).outcome(), StageOutcome::TimedOut);
        assert_eq!(StageResult::TimedOut(last).poll_outcome().map(|o| o.attempt), Some(1));
        assert_eq!(StageOutcome::TimedOut.to_string(), "timed_out");
    }
}
