//! Testing utilities for svcflow pipelines.
//!
//! This module provides:
//! - A scripted in-memory transport that records every request
//! - Assertions over pipeline reports

mod assertions;
mod transport;

pub use assertions::{
    assert_context_value, assert_failed_with, assert_stage_outcome, assert_succeeded,
};
pub use transport::ScriptedTransport;
