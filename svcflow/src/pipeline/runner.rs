//! Sequential pipeline execution.

use super::report::{PipelineReport, RunFailure, StageRecord, TIMEOUT_KIND};
use super::Pipeline;
use crate::auth::{CredentialProvider, Token};
use crate::context::{value_to_text, PipelineContext};
use crate::errors::{AuthError, FailureReason};
use crate::events::LifecycleEvent;
use crate::core::ResourceHandle;
use crate::stages::{Stage, StageContext, StageOutcome, StageOutput, StageResult};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

impl Pipeline {
    /// Acquires a token and runs the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if no token can be acquired; no stage runs in
    /// that case.
    pub async fn run_with_credentials(
        &self,
        provider: &dyn CredentialProvider,
        initial: PipelineContext,
    ) -> Result<PipelineReport, AuthError> {
        let token = provider.acquire_token().await?;
        Ok(self.run(&token, initial).await)
    }

    /// Runs every stage in order, stopping at the first one that does
    /// not succeed.
    ///
    /// Nothing is rolled back on failure: resources created by earlier
    /// stages stay, and their ids remain in the report's context.
    pub async fn run(&self, token: &Token, initial: PipelineContext) -> PipelineReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut context = initial;
        let mut records = Vec::with_capacity(self.stages.len());
        let mut failure = None;

        info!(run_id = %run_id, pipeline = %self.name, stages = self.stages.len(), "Pipeline started");
        self.emit(
            LifecycleEvent::PipelineStarted,
            json!({"run_id": run_id, "pipeline": self.name, "stages": self.stage_names()}),
        )
        .await;

        for stage in &self.stages {
            if failure.is_some() {
                records.push(StageRecord::not_run(stage.name(), stage.kind()));
                continue;
            }
            let (record, stop) = self.run_stage(run_id, stage, token, &mut context).await;
            records.push(record);
            failure = stop;
        }

        let finished_at = Utc::now();
        match &failure {
            None => {
                info!(run_id = %run_id, pipeline = %self.name, "Pipeline completed");
                self.emit(
                    LifecycleEvent::PipelineCompleted,
                    json!({"run_id": run_id, "pipeline": self.name}),
                )
                .await;
            }
            Some(f) => {
                warn!(
                    run_id = %run_id,
                    pipeline = %self.name,
                    stage = %f.stage,
                    kind = %f.kind,
                    "Pipeline aborted"
                );
                self.emit(
                    LifecycleEvent::PipelineAborted,
                    json!({"run_id": run_id, "pipeline": self.name, "failure": f}),
                )
                .await;
            }
        }

        PipelineReport {
            run_id,
            pipeline: self.name.clone(),
            started_at,
            finished_at,
            stages: records,
            context,
            failure,
        }
    }

    async fn run_stage(
        &self,
        run_id: Uuid,
        stage: &Arc<dyn Stage>,
        token: &Token,
        context: &mut PipelineContext,
    ) -> (StageRecord, Option<RunFailure>) {
        let name = stage.name();
        info!(run_id = %run_id, stage = %name, kind = %stage.kind(), "Stage started");
        self.emit(
            LifecycleEvent::StageStarted,
            json!({"run_id": run_id, "stage": name, "kind": stage.kind()}),
        )
        .await;

        let started = Instant::now();
        let result = {
            let ctx = StageContext {
                stage_name: name,
                context,
                token,
                transport: self.transport.as_ref(),
                base_url: &self.base_url,
            };
            stage.run(&ctx).await
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut record = StageRecord::not_run(name, stage.kind());
        record.outcome = result.outcome();
        record.duration_ms = duration_ms;
        if let Some(last) = result.poll_outcome() {
            record.attempts = Some(last.attempt);
            record.last_status = Some(last.status.clone());
        }

        let reason = match result {
            StageResult::Ok(output) => match self.commit(run_id, name, output, context).await {
                Ok(handle) => {
                    record.handle = handle;
                    return (record, None);
                }
                Err(reason) => reason,
            },
            StageResult::Failed(reason) => reason,
            StageResult::TimedOut(last) => {
                let message = format!(
                    "Poll budget exhausted after {} attempt(s); last status '{}'",
                    last.attempt, last.status
                );
                record.error = Some(message.clone());
                self.emit(
                    LifecycleEvent::StageTimedOut,
                    json!({
                        "run_id": run_id,
                        "stage": name,
                        "last_status": last.status,
                        "attempts": last.attempt,
                    }),
                )
                .await;
                let failure = RunFailure {
                    stage: name.to_string(),
                    kind: TIMEOUT_KIND.to_string(),
                    message,
                    last_status: Some(last.status),
                    attempts: Some(last.attempt),
                };
                return (record, Some(failure));
            }
        };

        record.outcome = StageOutcome::Failed;
        record.error = Some(reason.to_string());
        self.emit(
            LifecycleEvent::StageFailed,
            json!({"run_id": run_id, "stage": name, "reason": reason}),
        )
        .await;
        let failure = RunFailure {
            stage: name.to_string(),
            kind: reason.kind().to_string(),
            message: reason.to_string(),
            last_status: reason
                .last_status()
                .map(str::to_string)
                .or_else(|| record.last_status.clone()),
            attempts: match &reason {
                FailureReason::RemoteFailure { attempt, .. } => Some(*attempt),
                _ => record.attempts,
            },
        };
        (record, Some(failure))
    }

    /// Merges a stage's output into the context and persists new keys.
    async fn commit(
        &self,
        run_id: Uuid,
        stage: &str,
        output: StageOutput,
        context: &mut PipelineContext,
    ) -> Result<Option<ResourceHandle>, FailureReason> {
        let added = context.merge(output.patch)?;

        if let Some(store) = &self.store {
            for key in &added {
                if let Some(value) = context.get(key) {
                    if let Err(e) = store.put(key, &value_to_text(value)).await {
                        warn!(run_id = %run_id, stage, key = %key, error = %e, "Failed to persist value");
                    }
                }
            }
        }

        info!(run_id = %run_id, stage, keys = ?added, "Stage completed");
        self.emit(
            LifecycleEvent::StageCompleted,
            json!({
                "run_id": run_id,
                "stage": stage,
                "keys": added,
                "handle": output.handle,
                "attempts": output.poll.as_ref().map(|p| p.attempt),
            }),
        )
        .await;

        Ok(output.handle)
    }

    async fn emit(&self, event: LifecycleEvent, data: serde_json::Value) {
        self.sink.emit(event.as_str(), Some(data)).await;
    }
}
