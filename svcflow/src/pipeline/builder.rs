//! Pipeline builder with validation.

use super::Pipeline;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::events::{EventSink, LoggingEventSink};
use crate::stages::Stage;
use crate::store::Store;
use crate::transport::Transport;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated pipelines.
///
/// Stages run in the order they are added. `build` checks the wiring:
/// every input a stage declares must be a seed key or an output of an
/// earlier stage, and no two stages may share a name or an output.
#[derive(Clone)]
pub struct PipelineBuilder {
    name: String,
    base_url: String,
    stages: Vec<Arc<dyn Stage>>,
    seed_keys: Vec<String>,
    sink: Option<Arc<dyn EventSink>>,
    store: Option<Arc<dyn Store>>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: String::new(),
            stages: Vec::new(),
            seed_keys: Vec::new(),
            sink: None,
            store: None,
        }
    }

    /// Sets the API base URL stage paths are relative to.
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Declares a key the initial context will carry.
    #[must_use]
    pub fn seed_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.seed_keys.contains(&key) {
            self.seed_keys.push(key);
        }
        self
    }

    /// Declares several seed keys.
    #[must_use]
    pub fn seed_keys<K: Into<String>>(self, keys: impl IntoIterator<Item = K>) -> Self {
        keys.into_iter().fold(self, |builder, key| builder.seed_key(key))
    }

    /// Sets the event sink. Defaults to a [`LoggingEventSink`].
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Sets the store produced keys are persisted to.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates the wiring and builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineValidationError` if the pipeline is empty, has no
    /// base URL, or its stages are miswired.
    pub fn build(self, transport: Arc<dyn Transport>) -> Result<Pipeline, PipelineValidationError> {
        self.validate()?;
        Ok(Pipeline {
            name: self.name,
            base_url: self.base_url,
            stages: self.stages,
            seed_keys: self.seed_keys,
            transport,
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(LoggingEventSink::default())),
            store: self.store,
        })
    }

    fn validate(&self) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new("Pipeline has no stages").with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no base URL",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-NO-BASE-URL", "Stage paths need a base URL")
                    .with_fix_hint("Call base_url() with the API root before building."),
            ));
        }

        let mut names = HashSet::new();
        // output key -> producing stage
        let mut produced: HashMap<String, String> = HashMap::new();

        for stage in &self.stages {
            let name = stage.name().to_string();
            if !names.insert(name.clone()) {
                return Err(PipelineValidationError::new(format!(
                    "Stage name '{name}' is used more than once"
                ))
                .with_stages(vec![name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "PIPELINE-DUPLICATE-STAGE",
                        format!("Duplicate stage '{name}'"),
                    )
                    .with_fix_hint("Give every stage a unique name."),
                ));
            }

            for input in stage.inputs() {
                if !produced.contains_key(&input) && !self.seed_keys.contains(&input) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{name}' reads '{input}', which no earlier stage produces"
                    ))
                    .with_stages(vec![name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-UNSATISFIED-INPUT",
                            format!("Input '{input}' is not available"),
                        )
                        .with_fix_hint(
                            "Add a stage producing the key before this one, or declare it as a seed key.",
                        )
                        .with_context_entry("stage", name.clone())
                        .with_context_entry("input", input.clone()),
                    ));
                }
            }

            for output in stage.outputs() {
                if self.seed_keys.contains(&output) {
                    return Err(PipelineValidationError::new(format!(
                        "Stage '{name}' writes '{output}', which is also a seed key"
                    ))
                    .with_stages(vec![name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-SEED-OUTPUT-CONFLICT",
                            format!("Output '{output}' would overwrite a seed value"),
                        )
                        .with_fix_hint("Rename the output or drop the seed key."),
                    ));
                }
                if let Some(owner) = produced.insert(output.clone(), name.clone()) {
                    return Err(PipelineValidationError::new(format!(
                        "Output '{output}' is produced by both '{owner}' and '{name}'"
                    ))
                    .with_stages(vec![owner, name.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "PIPELINE-DUPLICATE-OUTPUT",
                            format!("Output '{output}' has two producers"),
                        )
                        .with_fix_hint("Each context key can only be written once per run."),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("stages", &self.stages)
            .field("seed_keys", &self.seed_keys)
            .finish_non_exhaustive()
    }
}
