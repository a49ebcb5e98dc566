//! Pipeline building and execution.
//!
//! This module provides:
//! - [`PipelineBuilder`], which checks stage wiring before anything runs
//! - [`Pipeline`], a strictly sequential run over shared stages
//! - [`PipelineReport`], produced for every run whatever its outcome

mod builder;
mod report;
mod runner;

pub use builder::PipelineBuilder;
pub use report::{PipelineReport, RunFailure, StageRecord, TIMEOUT_KIND};

use crate::events::EventSink;
use crate::stages::Stage;
use crate::store::Store;
use crate::transport::Transport;
use std::fmt;
use std::sync::Arc;

/// A validated, ordered sequence of stages.
///
/// A pipeline holds no per-run state. Each call to [`Pipeline::run`]
/// owns its own context, so one pipeline can serve concurrent runs.
pub struct Pipeline {
    name: String,
    base_url: String,
    stages: Vec<Arc<dyn Stage>>,
    seed_keys: Vec<String>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn EventSink>,
    store: Option<Arc<dyn Store>>,
}

impl Pipeline {
    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the API base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the stage names, in run order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the keys the initial context is expected to carry.
    #[must_use]
    pub fn seed_keys(&self) -> &[String] {
        &self.seed_keys
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("stages", &self.stage_names())
            .field("seed_keys", &self.seed_keys)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
