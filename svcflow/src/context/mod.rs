//! Context management for pipeline execution.
//!
//! This module provides:
//! - The append-only context a pipeline run threads between stages
//! - Declared-input resolution for a single stage

mod bags;
mod inputs;

pub use bags::{value_to_text, ContextPatch, PipelineContext};
pub use inputs::StageInputs;
