//! Resource polling stage.

use super::{RequestTemplate, Stage, StageContext, StageOutput, StageResult};
use crate::core::{Observation, PollOutcome, ResourceKind, StatusClass, TerminalStateSet};
use crate::errors::FailureReason;
use crate::extract::{extract_fields, find, FieldPath};
use crate::poll::{poll, PollError, PollPolicy};
use crate::transport::{HttpResponse, Transport};
use async_trait::async_trait;
use tracing::{info, warn};

/// What a polling stage writes to the context on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutput {
    /// The terminal status itself.
    Status,
    /// A field extracted alongside the status.
    Field(String),
}

/// Polls a resource until it reaches a terminal state.
///
/// The same request is sent on every attempt. A transport failure or a
/// non-2xx answer ends the stage at once; they are not retried.
#[derive(Debug, Clone)]
pub struct PollStage {
    name: String,
    kind: ResourceKind,
    request: RequestTemplate,
    status_candidates: Vec<FieldPath>,
    terminal: TerminalStateSet,
    policy: PollPolicy,
    outputs: Vec<(String, PollOutput)>,
}

impl PollStage {
    /// Creates a polling stage with no outputs that reads the `status`
    /// field.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        request: RequestTemplate,
        terminal: TerminalStateSet,
        policy: PollPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            request,
            status_candidates: vec![FieldPath::field("status")],
            terminal,
            policy,
            outputs: Vec::new(),
        }
    }

    /// Sets the status candidates, in priority order.
    #[must_use]
    pub fn with_status_candidates(mut self, candidates: Vec<FieldPath>) -> Self {
        self.status_candidates = candidates;
        self
    }

    /// Writes `source` under `key` when the resource succeeds.
    #[must_use]
    pub fn with_output(mut self, key: impl Into<String>, source: PollOutput) -> Self {
        self.outputs.push((key.into(), source));
        self
    }

    /// Returns the poll policy.
    #[must_use]
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Fields to extract on every attempt.
    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.terminal.required_fields().map(str::to_string).collect();
        for (_, source) in &self.outputs {
            if let PollOutput::Field(name) = source {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Builds the success patch. A declared field absent from the
    /// terminal response fails with `IdNotFound`.
    fn success_output(&self, outcome: &PollOutcome) -> Result<StageOutput, FailureReason> {
        let mut output = StageOutput::new();
        for (key, source) in &self.outputs {
            let value = match source {
                PollOutput::Status => outcome.status.clone(),
                PollOutput::Field(name) => outcome
                    .field(name)
                    .map(str::to_string)
                    .ok_or_else(|| FailureReason::IdNotFound {
                        candidates: vec![name.clone()],
                    })?,
            };
            output = output.with_value(key.clone(), value);
        }
        Ok(output)
    }

    fn observe(&self, response: &HttpResponse, field_names: &[String]) -> Result<Observation, FailureReason> {
        if !response.is_success() {
            return Err(FailureReason::TransportStatus {
                status_code: response.status_code,
                body: response.body_excerpt(),
            });
        }
        let Some(body) = response.json_body() else {
            return Ok(Observation::default());
        };
        Ok(Observation {
            status: find(body, &self.status_candidates).unwrap_or_default(),
            extracted: extract_fields(body, field_names.iter().map(String::as_str)),
        })
    }
}

#[async_trait]
impl Stage for PollStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn inputs(&self) -> Vec<String> {
        self.request.referenced_keys()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.iter().map(|(key, _)| key.clone()).collect()
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        let request = match ctx
            .resolve_inputs(&self.inputs())
            .and_then(|inputs| self.request.render(ctx.base_url, &inputs))
        {
            Ok(request) => request.with_token(ctx.token.clone()),
            Err(reason) => return StageResult::Failed(reason),
        };

        let field_names = self.field_names();
        let transport: &dyn Transport = ctx.transport;
        let fetch = |_attempt: u32| {
            let request = request.clone();
            let field_names = &field_names;
            async move {
                let response = transport.request(request).await?;
                self.observe(&response, field_names)
            }
        };

        match poll(fetch, &self.terminal, &self.policy).await {
            Ok(outcome) if outcome.class == StatusClass::Success => {
                info!(
                    stage = %self.name,
                    kind = %self.kind,
                    status = %outcome.status,
                    attempts = outcome.attempt,
                    "Resource reached success state"
                );
                match self.success_output(&outcome) {
                    Ok(output) => StageResult::Ok(output.with_poll(outcome)),
                    Err(reason) => {
                        warn!(stage = %self.name, error = %reason, "Declared output missing from terminal response");
                        StageResult::Failed(reason)
                    }
                }
            }
            Ok(outcome) => {
                warn!(
                    stage = %self.name,
                    kind = %self.kind,
                    status = %outcome.status,
                    attempts = outcome.attempt,
                    "Resource reached failure state"
                );
                StageResult::Failed(FailureReason::RemoteFailure {
                    status: outcome.status,
                    attempt: outcome.attempt,
                })
            }
            Err(PollError::Timeout(last)) => {
                warn!(
                    stage = %self.name,
                    kind = %self.kind,
                    last_status = %last.status,
                    attempts = last.attempt,
                    "Poll budget exhausted"
                );
                StageResult::TimedOut(last)
            }
            Err(PollError::Fetch { attempt, error }) => {
                warn!(stage = %self.name, attempt, error = %error, "Poll fetch failed");
                StageResult::Failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::context::PipelineContext;
    use crate::errors::TransportError;
    use crate::stages::TemplateValue;
    use crate::transport::MockTransport;
    use mockall::Sequence;
    use serde_json::json;
    use std::time::Duration;

    const BASE: &str = "https://api.example.com";

    fn deployment_stage(max_attempts: u32) -> PollStage {
        PollStage::new(
            "poll_deployment",
            ResourceKind::Deployment,
            RequestTemplate::get("/aiservice/deployments")
                .query("deploymentId", TemplateValue::from_context("deploymentId"))
                .query("serviceId", TemplateValue::from_context("serviceId")),
            TerminalStateSet::new().success("Completed").failure("Failed"),
            PollPolicy::new(max_attempts, Duration::from_secs(4)).unwrap(),
        )
        .with_output("deploymentStatus", PollOutput::Status)
    }

    fn training_stage() -> PollStage {
        PollStage::new(
            "poll_training",
            ResourceKind::Experiment,
            RequestTemplate::get("/trainexperiment")
                .query("experimentId", TemplateValue::from_context("experimentId")),
            TerminalStateSet::new()
                .success("Completed")
                .failure("Failed")
                .requiring("dep_id"),
            PollPolicy::new(20, Duration::from_secs(4)).unwrap(),
        )
        .with_output("deploymentId", PollOutput::Field("dep_id".to_string()))
    }

    fn seeded() -> PipelineContext {
        PipelineContext::new()
            .with_value("serviceId", "S1")
            .unwrap()
            .with_value("deploymentId", "DEP1")
            .unwrap()
            .with_value("experimentId", "E1")
            .unwrap()
    }

    async fn run_with(stage: &PollStage, transport: MockTransport, context: &PipelineContext) -> StageResult {
        let token = Token::new("tok");
        let ctx = StageContext {
            stage_name: stage.name(),
            context,
            token: &token,
            transport: &transport,
            base_url: BASE,
        };
        stage.run(&ctx).await
    }

    fn scripted(bodies: Vec<serde_json::Value>) -> MockTransport {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        for body in bodies {
            transport
                .expect_request()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(HttpResponse::json(200, body.clone())));
        }
        transport
    }

    #[tokio::test(start_paused = true)]
    async fn test_deployment_success_after_pending() {
        let transport = scripted(vec![json!({"status": "Pending"}), json!({"status": "Completed"})]);

        let result = run_with(&deployment_stage(20), transport, &seeded()).await;

        match result {
            StageResult::Ok(output) => {
                assert_eq!(output.patch.get("deploymentStatus"), Some(&json!("Completed")));
                assert_eq!(output.poll.map(|o| o.attempt), Some(2));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deployment_failure_status() {
        let transport = scripted(vec![json!({"status": "Failed"})]);

        let result = run_with(&deployment_stage(20), transport, &seeded()).await;

        assert_eq!(
            result,
            StageResult::Failed(FailureReason::RemoteFailure {
                status: "Failed".to_string(),
                attempt: 1
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_timeout() {
        let transport = scripted(vec![json!({"status": "Pending"})]);

        let result = run_with(&deployment_stage(1), transport, &seeded()).await;

        match result {
            StageResult::TimedOut(last) => {
                assert_eq!(last.status, "Pending");
                assert_eq!(last.attempt, 1);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_waits_for_deployment_id() {
        let transport = scripted(vec![
            json!({"E1": {"status": "InProgress"}}),
            json!({"E1": {"status": "Completed"}}),
            json!({"E1": {"status": "Completed", "dep_id": "DEP9"}}),
        ]);

        let result = run_with(&training_stage(), transport, &seeded()).await;

        match result {
            StageResult::Ok(output) => {
                assert_eq!(output.patch.get("deploymentId"), Some(&json!("DEP9")));
                assert_eq!(output.poll.map(|o| o.attempt), Some(3));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_without_declared_field_fails() {
        // No `requiring` rule, so "Completed" alone is a success.
        let stage = PollStage::new(
            "poll_training",
            ResourceKind::Experiment,
            RequestTemplate::get("/trainexperiment")
                .query("experimentId", TemplateValue::from_context("experimentId")),
            TerminalStateSet::new().success("Completed").failure("Failed"),
            PollPolicy::new(20, Duration::from_secs(4)).unwrap(),
        )
        .with_output("deploymentId", PollOutput::Field("dep_id".to_string()));
        let transport = scripted(vec![json!({"E1": {"status": "Completed"}})]);

        let result = run_with(&stage, transport, &seeded()).await;

        assert_eq!(
            result,
            StageResult::Failed(FailureReason::IdNotFound {
                candidates: vec!["dep_id".to_string()]
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_carries_query_and_token() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .withf(|req| {
                req.url == "https://api.example.com/aiservice/deployments"
                    && req.query_param("deploymentId") == Some("DEP1")
                    && req.query_param("serviceId") == Some("S1")
                    && req.token.is_some()
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::json(200, json!({"status": "Completed"}))));

        let result = run_with(&deployment_stage(20), transport, &seeded()).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .times(1)
            .returning(|_| Err(TransportError::Network("reset".to_string())));

        let result = run_with(&deployment_stage(20), transport, &seeded()).await;

        assert!(matches!(result, StageResult::Failed(FailureReason::Transport { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_status_is_not_retried() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .times(1)
            .returning(|_| Ok(HttpResponse::from_text(404, "not found")));

        let result = run_with(&deployment_stage(20), transport, &seeded()).await;

        assert!(matches!(
            result,
            StageResult::Failed(FailureReason::TransportStatus { status_code: 404, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_input_makes_no_call() {
        let mut transport = MockTransport::new();
        transport.expect_request().times(0);

        let context = PipelineContext::new().with_value("serviceId", "S1").unwrap();
        let result = run_with(&deployment_stage(20), transport, &context).await;

        assert_eq!(result, StageResult::Failed(FailureReason::missing_input("deploymentId")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_text_body_counts_as_pending() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .times(2)
            .returning(|_| Ok(HttpResponse::from_text(200, "warming up")));

        let result = run_with(&deployment_stage(2), transport, &seeded()).await;

        assert!(matches!(result, StageResult::TimedOut(ref last) if last.status.is_empty()));
    }
}
