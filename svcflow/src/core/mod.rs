//! Core domain model types for svcflow.
//!
//! This module contains the fundamental types used throughout the harness:
//! - Resource kinds and status classification
//! - Handles to created resources
//! - Poll observations and outcomes

mod handle;
mod outcome;
mod status;

pub use handle::ResourceHandle;
pub use outcome::{Observation, PollOutcome};
pub use status::{ResourceKind, StatusClass, TerminalStateSet};
