//! # Svcflow
//!
//! End-to-end harness for a remote machine-learning service API.
//!
//! Svcflow drives a chain of remote resources (service, dataset,
//! feature-engineering report, training experiment, deployment) through
//! a sequential pipeline:
//!
//! - **Stages**: creation calls that yield an id, and bounded polls that
//!   wait for a resource to reach a terminal state
//! - **Context threading**: ids produced by one stage become inputs of
//!   later ones, in an append-only context
//! - **Loose extraction**: ids and statuses found by prioritized field
//!   names, one level deep under a wrapping key
//! - **Reports**: every run ends in a serializable report naming the
//!   stage, failure kind and last status when something went wrong
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use svcflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = HarnessConfig::from_env()?;
//! let transport = Arc::new(ReqwestTransport::new(config.token_scheme, config.request_timeout())?);
//! let pipeline = workflow_builder(&config)?
//!     .store(Arc::new(FileStore::new(&config.store_dir)))
//!     .build(transport)?;
//!
//! let initial = initial_context(&config.workflow, now_utc())?;
//! let report = pipeline.run(&Token::new(token), initial).await;
//! println!("{}", report.to_json_pretty()?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod extract;
pub mod observability;
pub mod pipeline;
pub mod poll;
pub mod stages;
pub mod store;
pub mod testing;
pub mod transport;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{
        CognitoCredentialProvider, CognitoCredentials, CredentialProvider,
        StaticCredentialProvider, Token,
    };
    pub use crate::config::{FeatureFlag, HarnessConfig, PollSettings, WorkflowSettings};
    pub use crate::context::{ContextPatch, PipelineContext, StageInputs};
    pub use crate::core::{
        Observation, PollOutcome, ResourceHandle, ResourceKind, StatusClass, TerminalStateSet,
    };
    pub use crate::errors::{
        AuthError, ConfigError, ContextConflictError, ContractErrorInfo, FailureReason,
        PipelineValidationError, StoreError, SvcflowError, TransportError,
    };
    pub use crate::events::{
        CollectingEventSink, EventSink, LifecycleEvent, LoggingEventSink, NoOpEventSink,
    };
    pub use crate::extract::{extract, extract_fields, Extraction, FieldPath};
    pub use crate::pipeline::{Pipeline, PipelineBuilder, PipelineReport, RunFailure, StageRecord};
    pub use crate::poll::{poll, PollError, PollPolicy};
    pub use crate::stages::{
        CheckStage, CreateStage, PollOutput, PollStage, RequestTemplate, Stage, StageContext, StageOutcome,
        StageOutput, StageResult, TemplateValue,
    };
    pub use crate::store::{seed_context_from_store, FileStore, InMemoryStore, Store};
    #[cfg(feature = "http")]
    pub use crate::transport::ReqwestTransport;
    pub use crate::transport::{
        HttpMethod, HttpRequest, HttpResponse, ResponseBody, TokenScheme, Transport,
    };
    pub use crate::utils::{generate_service_name, now_utc};
    pub use crate::workflow::{
        begin_fresh_run, deployment_poll_builder, initial_context, resume_builder, workflow_builder,
    };
}

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
