//! Error types for the svcflow harness.
//!
//! Stage-level failures are not errors in the `Result` sense: a stage
//! reports them as [`FailureReason`] inside its `StageResult` and the
//! pipeline turns the first one into the run's report. The types here
//! cover everything around that: collaborators (auth, transport, store),
//! configuration and pipeline construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for svcflow operations.
#[derive(Debug, Error)]
pub enum SvcflowError {
    /// Credential acquisition failed.
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// A remote call could not be completed.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The persistence side channel failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Configuration was missing or invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A pipeline could not be assembled.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A context key was written twice.
    #[error("{0}")]
    ContextConflict(#[from] ContextConflictError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error raised when a bearer token cannot be obtained.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The identity endpoint could not be reached.
    #[error("Authentication request failed: {0}")]
    Request(String),

    /// The identity endpoint answered with a non-success status.
    #[error("Authentication rejected with HTTP {status_code}: {body}")]
    Rejected {
        /// The HTTP status code.
        status_code: u16,
        /// The response body, as text.
        body: String,
    },

    /// The response did not carry a token where one was expected.
    #[error("Authentication response has no token at '{path}'")]
    MissingToken {
        /// The JSON path that was inspected.
        path: String,
    },
}

/// Error raised by a [`Transport`](crate::transport::Transport).
///
/// Non-2xx answers are *not* transport errors: they come back as a normal
/// response and the calling stage decides what they mean.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS or protocol failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout {
        /// The configured per-request timeout.
        timeout_secs: u64,
    },

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Error raised by a [`Store`](crate::store::Store).
#[derive(Debug, Error)]
pub enum StoreError {
    /// No value exists under the key.
    #[error("Store key not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The key cannot be mapped to the backing medium.
    #[error("Invalid store key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Returns true if this is a not-found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Error raised when configuration cannot be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an unusable value.
    #[error("Invalid configuration for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration file could not be read.
    #[error("Cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid JSON for the expected shape.
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Creates an invalid-field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when writing to an existing key in a pipeline context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Context conflict: key '{key}' already exists")]
pub struct ContextConflictError {
    /// The conflicting key.
    pub key: String,
}

impl ContextConflictError {
    /// Creates a new context conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Why a single stage did not succeed.
///
/// Carried by `StageResult::Failed`; the pipeline copies it into the
/// report of the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// A declared input key is absent from the context.
    #[error("Missing input '{key}'")]
    MissingInput {
        /// The absent key.
        key: String,
    },

    /// The remote call failed before a response arrived.
    #[error("Transport failure: {message}")]
    Transport {
        /// The transport error text.
        message: String,
    },

    /// The remote call answered with a non-2xx status.
    #[error("Unexpected HTTP status {status_code}: {body}")]
    TransportStatus {
        /// The HTTP status code.
        status_code: u16,
        /// The response body, truncated.
        body: String,
    },

    /// A 2xx response did not contain the expected identifier.
    #[error("Identifier not found in response (tried: {})", .candidates.join(", "))]
    IdNotFound {
        /// The candidate field names that were tried.
        candidates: Vec<String>,
    },

    /// The remote resource reached an explicit failure status.
    #[error("Remote resource failed with status '{status}' after {attempt} attempt(s)")]
    RemoteFailure {
        /// The failure status.
        status: String,
        /// The poll attempt on which it was observed.
        attempt: u32,
    },

    /// The stage tried to write a key that already exists.
    #[error("Context conflict on key '{key}'")]
    ContextConflict {
        /// The conflicting key.
        key: String,
    },
}

impl FailureReason {
    /// Creates a missing-input failure.
    #[must_use]
    pub fn missing_input(key: impl Into<String>) -> Self {
        Self::MissingInput { key: key.into() }
    }

    /// Returns a stable identifier for the failure kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "missing_input",
            Self::Transport { .. } => "transport",
            Self::TransportStatus { .. } => "transport_status",
            Self::IdNotFound { .. } => "id_not_found",
            Self::RemoteFailure { .. } => "remote_failure",
            Self::ContextConflict { .. } => "context_conflict",
        }
    }

    /// Returns the remote status when the failure carries one.
    #[must_use]
    pub fn last_status(&self) -> Option<&str> {
        match self {
            Self::RemoteFailure { status, .. } => Some(status),
            _ => None,
        }
    }
}

impl From<TransportError> for FailureReason {
    fn from(err: TransportError) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

impl From<ContextConflictError> for FailureReason {
    fn from(err: ContextConflictError) -> Self {
        Self::ContextConflict { key: err.key }
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-DUPLICATE-OUTPUT").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when pipeline validation fails.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}
