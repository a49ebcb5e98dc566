//! svcflow - AI-service provisioning runner
//!
//! Runs the provisioning workflow against a live API and prints the run
//! report as JSON on stdout. Logs go to stderr.
//!
//! ## Commands
//!
//! - `run`: Create a service, dataset, report, experiment and wait for the deployment
//! - `poll-deployment`: Poll a deployment created by an earlier run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use svcflow::observability::{init_tracing, DEFAULT_LOG_LEVEL};
use svcflow::prelude::*;
use svcflow::workflow::{keys, DEPLOYMENT_POLL_KEYS, PRODUCED_KEYS};
use tracing::info;

#[derive(Parser)]
#[command(name = "svcflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Provision an AI service end to end and report what happened", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Read settings from a JSON file instead of the environment
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use this id token instead of logging in
    #[arg(long, global = true, env = "SVCFLOW_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full provisioning workflow
    Run {
        /// Skip stages whose results are already in the store
        #[arg(long)]
        resume_from_store: bool,
    },

    /// Poll the deployment recorded in the store
    PollDeployment,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { DEFAULT_LOG_LEVEL };
    init_tracing(cli.json_logs, level);

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let transport: Arc<dyn Transport> = Arc::new(
        ReqwestTransport::new(config.token_scheme, config.request_timeout())
            .context("Failed to build HTTP client")?,
    );
    let store = Arc::new(FileStore::new(&config.store_dir));
    let credentials = credential_provider(&config, cli.token, transport.clone())?;

    let (pipeline, initial) = match cli.command {
        Commands::Run { resume_from_store } => {
            workflow_run(&config, store.as_ref(), resume_from_store).await?
        }
        Commands::PollDeployment => {
            let seeded = seed_context_from_store(store.as_ref(), DEPLOYMENT_POLL_KEYS).await?;
            (deployment_poll_builder(&config)?, seeded)
        }
    };
    let pipeline = pipeline.store(store).build(transport)?;

    info!(pipeline = %pipeline.name(), stages = ?pipeline.stage_names(), "Starting run");
    let report = pipeline
        .run_with_credentials(credentials.as_ref(), initial)
        .await
        .context("Failed to obtain an id token")?;

    println!("{}", report.to_json_pretty()?);
    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig, SvcflowError> {
    let config = match path {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn credential_provider(
    config: &HarnessConfig,
    token: Option<String>,
    transport: Arc<dyn Transport>,
) -> Result<Box<dyn CredentialProvider>, SvcflowError> {
    if let Some(token) = token {
        return Ok(Box::new(StaticCredentialProvider::new(token)));
    }
    Ok(Box::new(CognitoCredentialProvider::new(
        transport,
        config.cognito_credentials()?,
    )))
}

/// Picks the stages and the starting context of a workflow run.
///
/// A fresh run clears ids left by earlier runs and records its generated
/// service name, so a later `--resume-from-store` or `poll-deployment`
/// only sees this run's values.
async fn workflow_run(
    config: &HarnessConfig,
    store: &dyn Store,
    resume: bool,
) -> Result<(PipelineBuilder, PipelineContext), SvcflowError> {
    if resume {
        let stored_keys = std::iter::once(keys::SERVICE_NAME).chain(PRODUCED_KEYS);
        let seeded = seed_context_from_store(store, stored_keys).await?;
        if seeded.contains_key(keys::SERVICE_NAME) {
            let (builder, context) = resume_builder(config, &seeded)?;
            info!(seeded = context.len(), "Resuming from stored values");
            return Ok((builder, context));
        }
        info!("Nothing to resume; starting a fresh run");
    }

    let initial = begin_fresh_run(store, &config.workflow, now_utc()).await?;
    Ok((workflow_builder(config)?, initial))
}
