//! Pipeline lifecycle events.
//!
//! A pipeline reports its progress to an [`EventSink`] handed to it at
//! build time. Event names are fixed (see [`LifecycleEvent`]); payloads
//! are small JSON objects carrying the run id, the stage name and
//! whatever the transition produced.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use std::fmt;

/// The transitions a pipeline run emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The run started.
    PipelineStarted,
    /// A stage started.
    StageStarted,
    /// A stage succeeded.
    StageCompleted,
    /// A stage failed.
    StageFailed,
    /// A polling stage ran out of attempts.
    StageTimedOut,
    /// Every stage succeeded.
    PipelineCompleted,
    /// A stage stopped the run.
    PipelineAborted,
}

impl LifecycleEvent {
    /// Returns the event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineStarted => "pipeline.started",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::StageTimedOut => "stage.timed_out",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineAborted => "pipeline.aborted",
        }
    }

    /// Returns true for events that signal something went wrong.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::StageFailed | Self::StageTimedOut | Self::PipelineAborted
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
