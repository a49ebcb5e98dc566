//! The AI-service provisioning workflow.
//!
//! Stages against the remote API, in order. Stages marked *check* are
//! read-only lookups that must answer 2xx and write nothing.
//!
//! | stage | call | writes |
//! |-------|------|--------|
//! | `check_feature_flag_*` (check, per configured flag) | `GET /featureFlags` | |
//! | `create_service` | `POST /aiservice` | `serviceId` |
//! | `check_service` (check) | `GET /aiservice/aiservices` | |
//! | `check_dataset_location` (check) | `GET /storage/s3/buckets` | |
//! | `create_dataset` | `POST /aiservice/datasets` | `dataId` |
//! | `check_data_analysis` (check) | `GET /aiservice/dataAnalysis` | |
//! | `start_feature_engineering` | `POST /aiservice/feature-engineering` | `reportId` |
//! | `check_dataset` (check) | `GET /aiservice/datasets` | |
//! | `poll_report` | `GET /dataprepreport` | `reportStatus` |
//! | `start_training` | `POST /train` | `experimentId` |
//! | `check_experiment` (check) | `GET /trainexperiment` | |
//! | `poll_training` | `GET /trainexperiment` | `deploymentId` |
//! | `poll_deployment` | `GET /aiservice/deployments` | `deploymentStatus` |
//! | `check_configuration` (check) | `GET /aiservice/configuration` | |
//!
//! The initial context carries `serviceName`, generated once per run.

use crate::config::{FeatureFlag, HarnessConfig, WorkflowSettings};
use crate::context::PipelineContext;
use crate::core::{ResourceKind, TerminalStateSet};
use crate::errors::{ConfigError, ContextConflictError, SvcflowError};
use crate::extract::FieldPath;
use crate::pipeline::PipelineBuilder;
use crate::poll::PollPolicy;
use crate::stages::{
    CheckStage, CreateStage, PollOutput, PollStage, RequestTemplate, Stage, TemplateValue,
};
use crate::store::Store;
use crate::utils::{generate_service_name, Timestamp};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Pipeline name of the full workflow.
pub const WORKFLOW_NAME: &str = "ai-service-provisioning";

/// Pipeline name of the standalone deployment poll.
pub const DEPLOYMENT_POLL_NAME: &str = "deployment-poll";

/// Context keys.
pub mod keys {
    /// Generated service name (seed).
    pub const SERVICE_NAME: &str = "serviceName";
    /// Service id.
    pub const SERVICE_ID: &str = "serviceId";
    /// Dataset id.
    pub const DATA_ID: &str = "dataId";
    /// Feature-engineering report id.
    pub const REPORT_ID: &str = "reportId";
    /// Terminal report status.
    pub const REPORT_STATUS: &str = "reportStatus";
    /// Training experiment id.
    pub const EXPERIMENT_ID: &str = "experimentId";
    /// Deployment id.
    pub const DEPLOYMENT_ID: &str = "deploymentId";
    /// Terminal deployment status.
    pub const DEPLOYMENT_STATUS: &str = "deploymentStatus";
}

/// Stage names.
pub mod stage_names {
    /// Creates the service.
    pub const CREATE_SERVICE: &str = "create_service";
    /// Registers the dataset.
    pub const CREATE_DATASET: &str = "create_dataset";
    /// Starts feature engineering.
    pub const START_FEATURE_ENGINEERING: &str = "start_feature_engineering";
    /// Polls the feature-engineering report.
    pub const POLL_REPORT: &str = "poll_report";
    /// Starts training.
    pub const START_TRAINING: &str = "start_training";
    /// Polls the training experiment.
    pub const POLL_TRAINING: &str = "poll_training";
    /// Polls the deployment.
    pub const POLL_DEPLOYMENT: &str = "poll_deployment";
    /// Looks the service up by name.
    pub const CHECK_SERVICE: &str = "check_service";
    /// Looks the source data up in storage.
    pub const CHECK_DATASET_LOCATION: &str = "check_dataset_location";
    /// Fetches the data analysis of the dataset.
    pub const CHECK_DATA_ANALYSIS: &str = "check_data_analysis";
    /// Looks the dataset up by id.
    pub const CHECK_DATASET: &str = "check_dataset";
    /// Looks the experiment up by id.
    pub const CHECK_EXPERIMENT: &str = "check_experiment";
    /// Fetches the service configuration.
    pub const CHECK_CONFIGURATION: &str = "check_configuration";
    /// Prefix of the per-flag check stages.
    pub const CHECK_FEATURE_FLAG_PREFIX: &str = "check_feature_flag";
}

/// Keys a standalone deployment poll needs from the store.
pub const DEPLOYMENT_POLL_KEYS: [&str; 2] = [keys::DEPLOYMENT_ID, keys::SERVICE_ID];

/// Every key the workflow writes, in stage order.
pub const PRODUCED_KEYS: [&str; 7] = [
    keys::SERVICE_ID,
    keys::DATA_ID,
    keys::REPORT_ID,
    keys::REPORT_STATUS,
    keys::EXPERIMENT_ID,
    keys::DEPLOYMENT_ID,
    keys::DEPLOYMENT_STATUS,
];

/// Report terminal states.
#[must_use]
pub fn report_terminal_states() -> TerminalStateSet {
    TerminalStateSet::new().success("ready").failure("Failed")
}

/// Training terminal states. Completion only counts once a deployment id
/// is present.
#[must_use]
pub fn training_terminal_states() -> TerminalStateSet {
    TerminalStateSet::new()
        .success("Completed")
        .failure("Failed")
        .requiring("dep_id")
}

/// Deployment terminal states.
#[must_use]
pub fn deployment_terminal_states() -> TerminalStateSet {
    TerminalStateSet::new().success("Completed").failure("Failed")
}

fn ctx(key: &str) -> TemplateValue {
    TemplateValue::from_context(key)
}

fn lit(value: &str) -> TemplateValue {
    TemplateValue::literal(value)
}

/// `POST /aiservice`.
#[must_use]
pub fn create_service_stage() -> CreateStage {
    CreateStage::new(
        stage_names::CREATE_SERVICE,
        ResourceKind::Service,
        RequestTemplate::post("/aiservice").body(TemplateValue::object([
            ("name", ctx(keys::SERVICE_NAME)),
            ("sheets", lit("false")),
        ])),
        keys::SERVICE_ID,
    )
    .with_id_candidates(FieldPath::fields(&["ser_id", "service_id", "id"]))
}

/// `POST /aiservice/datasets`.
#[must_use]
pub fn create_dataset_stage(settings: &WorkflowSettings) -> CreateStage {
    CreateStage::new(
        stage_names::CREATE_DATASET,
        ResourceKind::Dataset,
        RequestTemplate::post("/aiservice/datasets").body(TemplateValue::object([
            ("serviceName", ctx(keys::SERVICE_NAME)),
            ("cloud", lit(&settings.cloud)),
            ("source", lit(&settings.source)),
            (
                "location",
                TemplateValue::object([("bucket", lit(&settings.bucket)), ("key", lit(&settings.key))]),
            ),
            ("dataType", lit(&settings.data_type)),
        ])),
        keys::DATA_ID,
    )
    .with_id_candidates(FieldPath::fields(&["dataId", "data_id"]))
}

/// `POST /aiservice/feature-engineering`. The report id is the single
/// top-level key of the answer.
#[must_use]
pub fn start_feature_engineering_stage(settings: &WorkflowSettings) -> CreateStage {
    CreateStage::new(
        stage_names::START_FEATURE_ENGINEERING,
        ResourceKind::Report,
        RequestTemplate::post("/aiservice/feature-engineering").body(TemplateValue::object([
            ("problemType", lit(&settings.problem_type)),
            ("column", lit(&settings.target_column)),
            ("dataSourceId", ctx(keys::DATA_ID)),
            ("serviceId", ctx(keys::SERVICE_ID)),
            ("data_type", lit(&settings.data_type)),
            ("feEngine", lit(&settings.fe_engine)),
        ])),
        keys::REPORT_ID,
    )
    .with_id_candidates(vec![
        FieldPath::field("reportId"),
        FieldPath::field("report_id"),
        FieldPath::WrapperKey,
    ])
}

/// `GET /dataprepreport?reportId=`.
#[must_use]
pub fn poll_report_stage(policy: PollPolicy) -> PollStage {
    PollStage::new(
        stage_names::POLL_REPORT,
        ResourceKind::Report,
        RequestTemplate::get("/dataprepreport").query("reportId", ctx(keys::REPORT_ID)),
        report_terminal_states(),
        policy,
    )
    .with_status_candidates(FieldPath::fields(&["status", "report_status"]))
    .with_output(keys::REPORT_STATUS, PollOutput::Status)
}

/// `POST /train`.
#[must_use]
pub fn start_training_stage(settings: &WorkflowSettings) -> CreateStage {
    CreateStage::new(
        stage_names::START_TRAINING,
        ResourceKind::Experiment,
        RequestTemplate::post("/train").body(TemplateValue::object([
            ("roleARN", lit(&settings.role_arn)),
            ("serviceId", ctx(keys::SERVICE_ID)),
            ("reportId", ctx(keys::REPORT_ID)),
            ("mode", lit(&settings.training_mode)),
            ("launchMode", lit(&settings.launch_mode)),
        ])),
        keys::EXPERIMENT_ID,
    )
    .with_id_candidates(FieldPath::fields(&["exp_id", "experimentId"]))
}

/// `GET /trainexperiment?experimentId=`. Writes the deployment id the
/// finished experiment reports.
#[must_use]
pub fn poll_training_stage(policy: PollPolicy) -> PollStage {
    PollStage::new(
        stage_names::POLL_TRAINING,
        ResourceKind::Experiment,
        RequestTemplate::get("/trainexperiment").query("experimentId", ctx(keys::EXPERIMENT_ID)),
        training_terminal_states(),
        policy,
    )
    .with_output(keys::DEPLOYMENT_ID, PollOutput::Field("dep_id".to_string()))
}

/// `GET /aiservice/deployments?deploymentId=&serviceId=`.
#[must_use]
pub fn poll_deployment_stage(policy: PollPolicy) -> PollStage {
    PollStage::new(
        stage_names::POLL_DEPLOYMENT,
        ResourceKind::Deployment,
        RequestTemplate::get("/aiservice/deployments")
            .query("deploymentId", ctx(keys::DEPLOYMENT_ID))
            .query("serviceId", ctx(keys::SERVICE_ID)),
        deployment_terminal_states(),
        policy,
    )
    .with_output(keys::DEPLOYMENT_STATUS, PollOutput::Status)
}

/// `GET /featureFlags?flag=&feature=&count=1`.
#[must_use]
pub fn check_feature_flag_stage(flag: &FeatureFlag) -> CheckStage {
    CheckStage::new(
        format!(
            "{}_{}_{}",
            stage_names::CHECK_FEATURE_FLAG_PREFIX,
            flag.flag,
            flag.feature
        ),
        ResourceKind::FeatureFlag,
        RequestTemplate::get("/featureFlags")
            .query("flag", lit(&flag.flag))
            .query("feature", lit(&flag.feature))
            .query("count", lit("1")),
    )
}

/// `GET /aiservice/aiservices?serviceName=`.
#[must_use]
pub fn check_service_stage() -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_SERVICE,
        ResourceKind::Service,
        RequestTemplate::get("/aiservice/aiservices").query("serviceName", ctx(keys::SERVICE_NAME)),
    )
}

/// `GET /storage/s3/buckets?bucketName=&keyName=`.
#[must_use]
pub fn check_dataset_location_stage(settings: &WorkflowSettings) -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_DATASET_LOCATION,
        ResourceKind::Storage,
        RequestTemplate::get("/storage/s3/buckets")
            .query("bucketName", lit(&settings.bucket))
            .query("keyName", lit(&settings.key)),
    )
}

/// `GET /aiservice/dataAnalysis?dataId=`.
#[must_use]
pub fn check_data_analysis_stage() -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_DATA_ANALYSIS,
        ResourceKind::Dataset,
        RequestTemplate::get("/aiservice/dataAnalysis").query("dataId", ctx(keys::DATA_ID)),
    )
}

/// `GET /aiservice/datasets?dataId=&serviceId=`.
#[must_use]
pub fn check_dataset_stage() -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_DATASET,
        ResourceKind::Dataset,
        RequestTemplate::get("/aiservice/datasets")
            .query("dataId", ctx(keys::DATA_ID))
            .query("serviceId", ctx(keys::SERVICE_ID)),
    )
}

/// `GET /trainexperiment?experimentId=`, once, before polling starts.
#[must_use]
pub fn check_experiment_stage() -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_EXPERIMENT,
        ResourceKind::Experiment,
        RequestTemplate::get("/trainexperiment").query("experimentId", ctx(keys::EXPERIMENT_ID)),
    )
}

/// `GET /aiservice/configuration?name=`.
#[must_use]
pub fn check_configuration_stage() -> CheckStage {
    CheckStage::new(
        stage_names::CHECK_CONFIGURATION,
        ResourceKind::Service,
        RequestTemplate::get("/aiservice/configuration").query("name", ctx(keys::SERVICE_NAME)),
    )
}

/// Every stage of the workflow, in order.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if a poll budget is zero.
pub fn workflow_stages(config: &HarnessConfig) -> Result<Vec<Arc<dyn Stage>>, ConfigError> {
    let settings = &config.workflow;
    let mut stages: Vec<Arc<dyn Stage>> = settings
        .feature_flags
        .iter()
        .map(|flag| Arc::new(check_feature_flag_stage(flag)) as Arc<dyn Stage>)
        .collect();
    let core: [Arc<dyn Stage>; 13] = [
        Arc::new(create_service_stage()),
        Arc::new(check_service_stage()),
        Arc::new(check_dataset_location_stage(settings)),
        Arc::new(create_dataset_stage(settings)),
        Arc::new(check_data_analysis_stage()),
        Arc::new(start_feature_engineering_stage(settings)),
        Arc::new(check_dataset_stage()),
        Arc::new(poll_report_stage(config.polling.report.policy()?)),
        Arc::new(start_training_stage(settings)),
        Arc::new(check_experiment_stage()),
        Arc::new(poll_training_stage(config.polling.experiment.policy()?)),
        Arc::new(poll_deployment_stage(config.polling.deployment.policy()?)),
        Arc::new(check_configuration_stage()),
    ];
    stages.extend(core);
    Ok(stages)
}

/// A builder for the full workflow, seeded with `serviceName`.
///
/// Callers add a sink and store as needed, then build with a transport.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if a poll budget is zero.
pub fn workflow_builder(config: &HarnessConfig) -> Result<PipelineBuilder, ConfigError> {
    let builder = PipelineBuilder::new(WORKFLOW_NAME)
        .base_url(&config.api_base_url)
        .seed_key(keys::SERVICE_NAME);
    Ok(workflow_stages(config)?
        .into_iter()
        .fold(builder, PipelineBuilder::stage))
}

/// A builder that resumes the workflow from stored values, plus the
/// context to run it with.
///
/// The run restarts at the first stage whose outputs are not all in
/// `seeded`. Only `serviceName` and the outputs of the stages before that
/// point are kept in the returned context; later values are dropped.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if a poll budget is zero.
pub fn resume_builder(
    config: &HarnessConfig,
    seeded: &PipelineContext,
) -> Result<(PipelineBuilder, PipelineContext), ConfigError> {
    let stages = workflow_stages(config)?;
    let resume_at = stages
        .iter()
        .position(|stage| !stage.outputs().iter().all(|key| seeded.contains_key(key)))
        .unwrap_or(stages.len());

    let trusted: BTreeSet<String> = stages[..resume_at]
        .iter()
        .flat_map(|stage| stage.outputs())
        .chain(std::iter::once(keys::SERVICE_NAME.to_string()))
        .collect();
    let mut context = PipelineContext::new();
    for (key, value) in seeded.iter() {
        if !trusted.contains(key) {
            warn!(key, "Ignoring stored value past the resume point");
        } else if context.insert(key, value.clone()).is_err() {
            warn!(key, "Key seeded twice; keeping the first value");
        }
    }

    let builder = PipelineBuilder::new(WORKFLOW_NAME)
        .base_url(&config.api_base_url)
        .seed_key(keys::SERVICE_NAME)
        .seed_keys(context.keys());
    let builder = stages
        .into_iter()
        .skip(resume_at)
        .fold(builder, PipelineBuilder::stage);
    Ok((builder, context))
}

/// Starts a fresh run against a store.
///
/// Removes every id an earlier run stored, then stores the new service
/// name. Afterwards the store holds only values of this run.
///
/// # Errors
///
/// Returns `SvcflowError::Store` if the store cannot be cleared or
/// written.
pub async fn begin_fresh_run(
    store: &dyn Store,
    settings: &WorkflowSettings,
    at: Timestamp,
) -> Result<PipelineContext, SvcflowError> {
    for key in PRODUCED_KEYS {
        store.remove(key).await?;
    }
    let context = initial_context(settings, at)?;
    if let Some(name) = context.get_str(keys::SERVICE_NAME) {
        store.put(keys::SERVICE_NAME, name).await?;
        info!(service_name = name, "Starting a fresh run");
    }
    Ok(context)
}

/// A builder for polling an existing deployment, seeded with
/// `deploymentId` and `serviceId`.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` if the deployment poll budget is zero.
pub fn deployment_poll_builder(config: &HarnessConfig) -> Result<PipelineBuilder, ConfigError> {
    Ok(PipelineBuilder::new(DEPLOYMENT_POLL_NAME)
        .base_url(&config.api_base_url)
        .seed_keys(DEPLOYMENT_POLL_KEYS)
        .stage(Arc::new(poll_deployment_stage(
            config.polling.deployment.policy()?,
        ))))
}

/// The initial context of a fresh run.
///
/// # Errors
///
/// Never fails on an empty context; the `Result` follows
/// [`PipelineContext::with_value`].
pub fn initial_context(settings: &WorkflowSettings, at: Timestamp) -> Result<PipelineContext, ContextConflictError> {
    PipelineContext::new().with_value(
        keys::SERVICE_NAME,
        generate_service_name(&settings.service_name_prefix, at),
    )
}
