//! Stage trait and implementations.
//!
//! Stages are the units of work in a provisioning pipeline. This module
//! provides:
//! - The [`Stage`] trait and the per-run [`StageContext`]
//! - [`CreateStage`]: one remote call that yields a resource id
//! - [`PollStage`]: a bounded poll of a resource until a terminal state
//! - [`CheckStage`]: a read-only lookup that must answer 2xx
//! - Request templates and stage results

mod check;
mod create;
mod poll;
mod request;
mod result;

pub use check::CheckStage;
pub use create::CreateStage;
pub use poll::{PollOutput, PollStage};
pub use request::{join_url, RequestTemplate, TemplateValue};
pub use result::{StageOutcome, StageOutput, StageResult};

use crate::auth::Token;
use crate::context::{PipelineContext, StageInputs};
use crate::core::ResourceKind;
use crate::errors::FailureReason;
use crate::transport::Transport;
use async_trait::async_trait;
use std::fmt::{self, Debug};

/// What a stage can see while it runs.
///
/// Borrowed from the pipeline for the duration of one stage; a stage
/// never mutates the context directly.
pub struct StageContext<'a> {
    /// The name of the running stage.
    pub stage_name: &'a str,
    /// The context accumulated so far.
    pub context: &'a PipelineContext,
    /// The run's token.
    pub token: &'a Token,
    /// The transport to issue calls through.
    pub transport: &'a dyn Transport,
    /// The API base URL request paths are relative to.
    pub base_url: &'a str,
}

impl StageContext<'_> {
    /// Resolves declared inputs from the context.
    ///
    /// # Errors
    ///
    /// Returns `FailureReason::MissingInput` for the first absent key.
    pub fn resolve_inputs(&self, declared: &[String]) -> Result<StageInputs, FailureReason> {
        StageInputs::resolve(self.context, declared.iter().map(String::as_str))
    }
}

impl Debug for StageContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("stage_name", &self.stage_name)
            .field("context", &self.context)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Trait for pipeline stages.
///
/// Stages hold no per-run state, so one instance can be shared (via
/// `Arc`) by any number of concurrent runs.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Returns the kind of resource the stage creates or observes.
    fn kind(&self) -> ResourceKind;

    /// Context keys the stage reads.
    fn inputs(&self) -> Vec<String>;

    /// Context keys the stage writes on success.
    fn outputs(&self) -> Vec<String>;

    /// Runs the stage.
    ///
    /// Must not issue any remote call when a declared input is missing.
    async fn run(&self, ctx: &StageContext<'_>) -> StageResult;
}
