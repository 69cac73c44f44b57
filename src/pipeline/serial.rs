//! Sequential chain of providers.
//!
//! [`SerialPipeline`] passes each provider's output text as the next
//! provider's prompt. It fails fast: the first provider that fails after its
//! retries stops the chain, and the error names the 1-based stage index.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::{PipelineError, Result},
    events::Event,
    exec_ctx::ExecCtx,
    options::PipelineOptions,
    provider::Provider,
    retry::call_with_retry,
    types::{Request, Response, Usage},
};
use std::sync::Arc;

/// A sequential chain of providers.
///
/// # Example
///
/// ```ignore
/// let pipeline = SerialPipeline::new("draft-then-edit")
///     .push(registry.resolve("drafter", None)?)
///     .push(registry.resolve("editor", None)?);
/// let text = pipeline.execute(&ctx, "Write a haiku about rust").await?;
/// ```
pub struct SerialPipeline {
    name: String,
    providers: Vec<Arc<dyn Provider>>,
    options: PipelineOptions,
}

impl SerialPipeline {
    /// Create a new empty chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            options: PipelineOptions::default(),
        }
    }

    /// Add a provider to the end of the chain (builder style).
    pub fn push(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Add a provider to the end of the chain (mutation style).
    pub fn add(&mut self, provider: Arc<dyn Provider>) {
        self.providers.push(provider);
    }

    /// Set the retry options applied to every stage.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Run every stage, returning each stage's response in order.
    pub async fn execute_all(&self, ctx: &ExecCtx, request: Request) -> Result<Vec<Response>> {
        if self.providers.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "serial pipeline needs at least one provider".to_string(),
            ));
        }

        let policy = self.options.retry_policy();
        let mut outputs = Vec::with_capacity(self.providers.len());
        let mut current = request;

        for (idx, provider) in self.providers.iter().enumerate() {
            let stage = idx + 1;
            ctx.check_cancelled()?;
            ctx.emit(Event::StageStart {
                pipeline: self.name.clone(),
                stage,
                name: provider.name().to_string(),
            });
            tracing::debug!(pipeline = %self.name, stage, provider = provider.name(), "serial stage");

            let result = call_with_retry(ctx, provider.as_ref(), &current, &policy).await;
            ctx.emit(Event::StageEnd {
                pipeline: self.name.clone(),
                stage,
                name: provider.name().to_string(),
                ok: result.is_ok(),
            });
            let response = result.map_err(|e| e.in_stage(stage, provider.name()))?;

            current = current.with_prompt(response.content.clone());
            outputs.push(response);
        }

        Ok(outputs)
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        let outputs = self.execute_all(ctx, request).await?;
        let stages = outputs.len();
        let mut usage: Option<Usage> = None;
        for u in outputs.iter().filter_map(|r| r.usage.as_ref()) {
            usage.get_or_insert_with(Usage::default).add(u);
        }
        let mut last = outputs
            .into_iter()
            .last()
            .ok_or_else(|| PipelineError::Other("serial pipeline produced no outputs".into()))?;
        last.usage = usage.or(last.usage);
        last.set_meta("stages", stages);
        Ok(last)
    }
}

impl Pipeline for SerialPipeline {
    fn kind(&self) -> &'static str {
        "serial"
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
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_serial_pipes_output() {
        let first = Arc::new(MockProvider::fixed("first", "draft text"));
        let second = Arc::new(MockProvider::echo("second"));
        let pipeline = SerialPipeline::new("chain").push(first.clone()).push(second.clone());

        let resp = pipeline
            .execute_with_request(&ExecCtx::new(), Request::new("start"))
            .await
            .unwrap();
        assert_eq!(resp.content, "draft text");
        assert_eq!(resp.provider, "second");
        assert_eq!(resp.meta("stages"), Some(&serde_json::json!(2)));
        assert_eq!(first.prompts(), vec!["start"]);
        assert_eq!(second.prompts(), vec!["draft text"]);
    }

    #[tokio::test]
    async fn test_serial_failure_names_stage_and_hides_partial_output() {
        let spy = Arc::new(MockProvider::fixed("p1", "intermediate"));
        let broken = Arc::new(MockProvider::failing("p2", "backend down"));
        let pipeline = SerialPipeline::new("chain").push(spy.clone()).push(broken.clone());

        let result = pipeline.execute(&ExecCtx::new(), "go").await;
        let err = result.unwrap_err();
        match &err {
            PipelineError::StageFailed { stage, name, .. } => {
                assert_eq!(*stage, 2);
                assert_eq!(name, "p2");
            }
            other => panic!("expected StageFailed, got {other:?}"),
        }
        assert!(!err.to_string().contains("intermediate"));
        assert_eq!(spy.call_count(), 1);
        assert_eq!(broken.prompts(), vec!["intermediate"]);
    }

    #[tokio::test]
    async fn test_serial_retries_each_stage() {
        let flaky = Arc::new(MockProvider::fixed("flaky", "ok").failing_first(2));
        let pipeline = SerialPipeline::new("chain")
            .push(flaky.clone())
            .with_options(PipelineOptions::default().with_max_retries(3));
        assert_eq!(pipeline.execute(&ExecCtx::new(), "x").await.unwrap(), "ok");
        assert_eq!(flaky.call_count(), 3);
    }

    #[tokio::test]
    async fn test_serial_empty_fails() {
        let err = SerialPipeline::new("empty")
            .execute(&ExecCtx::new(), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_serial_cancellation_before_start() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecCtx::builder().cancellation(cancel.clone()).build();
        let mock = Arc::new(MockProvider::fixed("a", "x"));
        let pipeline = SerialPipeline::new("chain").push(mock.clone());

        cancel.store(true, Ordering::Relaxed);
        let err = pipeline.execute(&ctx, "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_serial_cancel_during_stage_stops_before_next() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecCtx::builder().cancellation(cancel.clone()).build();
        let first = Arc::new(MockProvider::fixed("first", "draft").cancelling(cancel.clone()));
        let second = Arc::new(MockProvider::echo("second"));
        let pipeline = SerialPipeline::new("chain").push(first.clone()).push(second.clone());

        let err = pipeline.execute(&ctx, "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled), "got {err:?}");
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test]
    async fn test_serial_execute_all() {
        let pipeline = SerialPipeline::new("chain")
            .push(Arc::new(MockProvider::fixed("a", "one")))
            .push(Arc::new(MockProvider::fixed("b", "two")));
        let outputs = pipeline
            .execute_all(&ExecCtx::new(), Request::new("x"))
            .await
            .unwrap();
        let contents: Vec<_> = outputs.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
