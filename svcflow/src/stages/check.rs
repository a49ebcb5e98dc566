//! Read-only verification stage.

use super::{RequestTemplate, Stage, StageContext, StageOutput, StageResult};
use crate::core::ResourceKind;
use crate::errors::FailureReason;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Issues one lookup call and requires a 2xx answer.
///
/// The body is not inspected and nothing is written to the context.
#[derive(Debug, Clone)]
pub struct CheckStage {
    name: String,
    kind: ResourceKind,
    request: RequestTemplate,
}

impl CheckStage {
    /// Creates a check stage.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind, request: RequestTemplate) -> Self {
        Self {
            name: name.into(),
            kind,
            request,
        }
    }

    /// Returns the request template.
    #[must_use]
    pub fn request(&self) -> &RequestTemplate {
        &self.request
    }

    async fn check(&self, ctx: &StageContext<'_>) -> Result<u16, FailureReason> {
        let inputs = ctx.resolve_inputs(&self.inputs())?;
        let request = self
            .request
            .render(ctx.base_url, &inputs)?
            .with_token(ctx.token.clone());

        let response = ctx.transport.request(request).await?;
        if !response.is_success() {
            return Err(FailureReason::TransportStatus {
                status_code: response.status_code,
                body: response.body_excerpt(),
            });
        }
        Ok(response.status_code)
    }
}

#[async_trait]
impl Stage for CheckStage {
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
        Vec::new()
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        match self.check(ctx).await {
            Ok(status_code) => {
                debug!(stage = %self.name, kind = %self.kind, status_code, "Check passed");
                StageResult::Ok(StageOutput::new())
            }
            Err(reason) => {
                warn!(stage = %self.name, kind = reason.kind(), error = %reason, "Check failed");
                StageResult::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Token;
    use crate::context::PipelineContext;
    use crate::stages::TemplateValue;
    use crate::transport::{HttpResponse, MockTransport};
    use serde_json::json;

    const BASE: &str = "https://api.example.com";

    fn dataset_check() -> CheckStage {
        CheckStage::new(
            "check_dataset",
            ResourceKind::Dataset,
            RequestTemplate::get("/aiservice/datasets")
                .query("dataId", TemplateValue::from_context("dataId"))
                .query("serviceId", TemplateValue::from_context("serviceId")),
        )
    }

    fn seeded() -> PipelineContext {
        PipelineContext::new()
            .with_value("serviceId", "S1")
            .unwrap()
            .with_value("dataId", "D1")
            .unwrap()
    }

    async fn run_with(stage: &CheckStage, transport: MockTransport, context: &PipelineContext) -> StageResult {
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

    #[test]
    fn test_declared_io() {
        let stage = dataset_check();
        assert_eq!(stage.inputs(), vec!["dataId".to_string(), "serviceId".to_string()]);
        assert!(stage.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_success_writes_nothing() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .withf(|req| {
                req.url == "https://api.example.com/aiservice/datasets"
                    && req.query_param("dataId") == Some("D1")
                    && req.query_param("serviceId") == Some("S1")
                    && req.body.is_none()
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::json(200, json!({"anything": "goes"}))));

        let result = run_with(&dataset_check(), transport, &seeded()).await;

        assert_eq!(result, StageResult::Ok(StageOutput::new()));
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .times(1)
            .returning(|_| Ok(HttpResponse::from_text(403, "Forbidden")));

        let result = run_with(&dataset_check(), transport, &seeded()).await;

        assert_eq!(
            result,
            StageResult::Failed(FailureReason::TransportStatus {
                status_code: 403,
                body: "Forbidden".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_missing_input_makes_no_call() {
        let mut transport = MockTransport::new();
        transport.expect_request().times(0);

        let context = PipelineContext::new().with_value("serviceId", "S1").unwrap();
        let result = run_with(&dataset_check(), transport, &context).await;

        assert_eq!(result, StageResult::Failed(FailureReason::missing_input("dataId")));
    }
}
