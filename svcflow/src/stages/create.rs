//! Resource creation stage.

use super::{RequestTemplate, Stage, StageContext, StageOutput, StageResult};
use crate::core::{ResourceHandle, ResourceKind};
use crate::errors::FailureReason;
use crate::extract::{find, FieldPath};
use async_trait::async_trait;
use tracing::{info, warn};

/// Issues one creation call and records the returned id.
///
/// A non-2xx answer, a transport failure, or a 2xx answer without any
/// of the id candidates all fail the stage. There are no retries.
#[derive(Debug, Clone)]
pub struct CreateStage {
    name: String,
    kind: ResourceKind,
    request: RequestTemplate,
    id_candidates: Vec<FieldPath>,
    output_key: String,
}

impl CreateStage {
    /// Creates a stage that writes the new id under `output_key`.
    ///
    /// The id is looked up in the `id` field unless other candidates are
    /// given with [`with_id_candidates`](Self::with_id_candidates).
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ResourceKind,
        request: RequestTemplate,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            request,
            id_candidates: vec![FieldPath::field("id")],
            output_key: output_key.into(),
        }
    }

    /// Sets the id candidates, in priority order.
    #[must_use]
    pub fn with_id_candidates(mut self, candidates: Vec<FieldPath>) -> Self {
        self.id_candidates = candidates;
        self
    }

    /// Returns the request template.
    #[must_use]
    pub fn request(&self) -> &RequestTemplate {
        &self.request
    }

    async fn create(&self, ctx: &StageContext<'_>) -> Result<StageOutput, FailureReason> {
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

        let id = response
            .json_body()
            .and_then(|body| find(body, &self.id_candidates))
            .ok_or_else(|| FailureReason::IdNotFound {
                candidates: self.id_candidates.iter().map(ToString::to_string).collect(),
            })?;

        info!(stage = %self.name, kind = %self.kind, id = %id, "Resource created");

        Ok(StageOutput::new()
            .with_value(self.output_key.clone(), id.clone())
            .with_handle(ResourceHandle::new(id, self.kind)))
    }
}

#[async_trait]
impl Stage for CreateStage {
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
        vec![self.output_key.clone()]
    }

    async fn run(&self, ctx: &StageContext<'_>) -> StageResult {
        match self.create(ctx).await {
            Ok(output) => StageResult::Ok(output),
            Err(reason) => {
                warn!(stage = %self.name, kind = reason.kind(), error = %reason, "Creation failed");
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
    use crate::errors::TransportError;
    use crate::stages::TemplateValue;
    use crate::transport::{HttpResponse, MockTransport};
    use serde_json::json;

    const BASE: &str = "https://api.example.com";

    fn service_stage() -> CreateStage {
        CreateStage::new(
            "create_service",
            ResourceKind::Service,
            RequestTemplate::post("/aiservice").body(TemplateValue::object([
                ("name", TemplateValue::from_context("serviceName")),
                ("sheets", TemplateValue::literal("false")),
            ])),
            "serviceId",
        )
        .with_id_candidates(FieldPath::fields(&["ser_id", "service_id", "id"]))
    }

    fn seeded() -> PipelineContext {
        PipelineContext::new()
            .with_value("serviceName", "TestService_1")
            .unwrap()
    }

    async fn run_with(stage: &CreateStage, transport: MockTransport, context: &PipelineContext) -> StageResult {
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
    fn test_declared_inputs_and_outputs() {
        let stage = service_stage();
        assert_eq!(stage.inputs(), vec!["serviceName".to_string()]);
        assert_eq!(stage.outputs(), vec!["serviceId".to_string()]);
    }

    #[tokio::test]
    async fn test_creates_resource() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .withf(|req| {
                req.url == "https://api.example.com/aiservice"
                    && req.token.as_ref().map(Token::as_str) == Some("tok")
                    && req.body == Some(json!({"name": "TestService_1", "sheets": "false"}))
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::json(200, json!({"service_id": "S1"}))));

        let result = run_with(&service_stage(), transport, &seeded()).await;

        match result {
            StageResult::Ok(output) => {
                assert_eq!(output.patch.get("serviceId"), Some(&json!("S1")));
                assert_eq!(output.handle, Some(ResourceHandle::new("S1", ResourceKind::Service)));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_input_makes_no_call() {
        let mut transport = MockTransport::new();
        transport.expect_request().times(0);

        let result = run_with(&service_stage(), transport, &PipelineContext::new()).await;

        assert_eq!(result, StageResult::Failed(FailureReason::missing_input("serviceName")));
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .returning(|_| Ok(HttpResponse::from_text(500, "boom")));

        let result = run_with(&service_stage(), transport, &seeded()).await;

        assert_eq!(
            result,
            StageResult::Failed(FailureReason::TransportStatus {
                status_code: 500,
                body: "boom".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_id_not_found() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .returning(|_| Ok(HttpResponse::json(200, json!({"message": "created"}))));

        let result = run_with(&service_stage(), transport, &seeded()).await;

        assert_eq!(
            result,
            StageResult::Failed(FailureReason::IdNotFound {
                candidates: vec!["ser_id".to_string(), "service_id".to_string(), "id".to_string()]
            })
        );
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let mut transport = MockTransport::new();
        transport
            .expect_request()
            .returning(|_| Err(TransportError::Timeout { timeout_secs: 30 }));

        let result = run_with(&service_stage(), transport, &seeded()).await;

        assert!(matches!(result, StageResult::Failed(FailureReason::Transport { .. })));
    }
}
