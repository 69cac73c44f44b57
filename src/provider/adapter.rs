//! Use a pipeline where a provider is expected.

use super::Provider;
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::pipeline::Pipeline;
use crate::types::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// Wraps a [`Pipeline`] so it can occupy a provider slot in a serial,
/// parallel, collaborative, or high-availability pipeline.
pub struct PipelineProvider {
    name: String,
    pipeline: Arc<dyn Pipeline>,
}

impl PipelineProvider {
    /// Expose `pipeline` under its own name.
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            name: pipeline.name().to_string(),
            pipeline,
        }
    }

    /// Expose `pipeline` under a different name.
    pub fn named(name: impl Into<String>, pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            name: name.into(),
            pipeline,
        }
    }
}

#[async_trait]
impl Provider for PipelineProvider {
    async fn generate_response(&self, ctx: &ExecCtx, request: &Request) -> Result<Response> {
        let mut response = self.pipeline.execute_with_request(ctx, request.clone()).await?;
        response.provider = self.name.clone();
        Ok(response)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.pipeline.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SerialPipeline;
    use crate::provider::MockProvider;

    #[tokio::test]
    async fn test_pipeline_as_provider() {
        let inner = SerialPipeline::new("inner")
            .push(Arc::new(MockProvider::fixed("a", "draft")))
            .push(Arc::new(MockProvider::echo("b")));
        let provider = PipelineProvider::named("team", Arc::new(inner));

        let resp = provider
            .generate_response(&ExecCtx::new(), &Request::new("topic"))
            .await
            .unwrap();
        assert_eq!(resp.content, "draft");
        assert_eq!(resp.provider, "team");
        assert_eq!(provider.model(), "serial");
    }
}
