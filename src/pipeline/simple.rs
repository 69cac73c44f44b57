//! A pipeline around a single provider.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::Result,
    exec_ctx::ExecCtx,
    options::PipelineOptions,
    provider::Provider,
    retry::call_with_retry,
    types::{Request, Response},
};
use std::sync::Arc;

/// Sends the request to one provider, retrying per its options.
pub struct SimplePipeline {
    name: String,
    provider: Arc<dyn Provider>,
    options: PipelineOptions,
}

impl SimplePipeline {
    /// Wrap a single provider.
    pub fn new(name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        Self {
            name: name.into(),
            provider,
            options: PipelineOptions::default(),
        }
    }

    /// Set the retry options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        call_with_retry(
            ctx,
            self.provider.as_ref(),
            &request,
            &self.options.retry_policy(),
        )
        .await
    }
}

impl Pipeline for SimplePipeline {
    fn kind(&self) -> &'static str {
        "simple"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn execute_with_request<'a>(
        &'a self,
        ctx: &'a ExecCtx,
        request: Request,
    ) -> BoxFut<'a, Result<Response>> {
        Box::pin(observed(ctx, self.kind(), &self.name, self.run(ctx, request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[tokio::test]
    async fn test_simple_retries() {
        let mock = Arc::new(MockProvider::fixed("m", "fine").failing_first(1));
        let pipeline = SimplePipeline::new("s", mock.clone())
            .with_options(PipelineOptions::default().with_max_retries(2));
        let out = pipeline.execute(&ExecCtx::new(), "q").await.unwrap();
        assert_eq!(out, "fine");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_simple_surfaces_provider_error() {
        let pipeline = SimplePipeline::new("s", Arc::new(MockProvider::failing("m", "nope")));
        let err = pipeline.execute(&ExecCtx::new(), "q").await.unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
