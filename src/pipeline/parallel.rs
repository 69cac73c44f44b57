//! Concurrent fan-out to several providers, fan-in through a combiner.
//!
//! Every provider gets the same request as an independent unit of work.
//! Outcomes land in slots matching provider order, not completion order, so
//! order-sensitive combiners behave deterministically. Failed slots are
//! omitted from the combiner input; only when every provider fails does the
//! pipeline fail.

use super::{observed, BoxFut, Pipeline};
use crate::{
    combiner::{ConcatCombiner, ResultCombiner},
    error::{PipelineError, Result},
    events::Event,
    exec_ctx::ExecCtx,
    options::PipelineOptions,
    provider::Provider,
    retry::call_with_retry,
    types::{Request, Response},
};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Fans a request out to N providers and combines the successes.
pub struct ParallelPipeline {
    name: String,
    providers: Vec<Arc<dyn Provider>>,
    combiner: Arc<dyn ResultCombiner>,
    options: PipelineOptions,
}

impl ParallelPipeline {
    /// Create with a [`ConcatCombiner`]; use [`with_combiner`](Self::with_combiner) to change it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            combiner: Arc::new(ConcatCombiner::default()),
            options: PipelineOptions::default(),
        }
    }

    /// Add a provider. Its slot is its position in the list.
    pub fn push(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Replace the combiner.
    pub fn with_combiner(mut self, combiner: Arc<dyn ResultCombiner>) -> Self {
        self.combiner = combiner;
        self
    }

    /// Set retry and concurrency options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// The combiner applied to successful slots.
    pub fn combiner(&self) -> &Arc<dyn ResultCombiner> {
        &self.combiner
    }

    /// Run every provider and return one outcome per provider, in provider order.
    pub async fn execute_slots(
        &self,
        ctx: &ExecCtx,
        request: &Request,
    ) -> Vec<Result<Response>> {
        let policy = self.options.retry_policy();
        let limit = self
            .options
            .max_concurrency
            .unwrap_or(self.providers.len())
            .max(1);

        let futs: Vec<BoxFut<'_, Result<Response>>> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                let request = request.clone();
                let policy = policy.clone();
                let fut: BoxFut<'_, Result<Response>> = Box::pin(async move {
                    tracing::debug!(pipeline = %self.name, provider = provider.name(), "dispatch");
                    call_with_retry(ctx, provider.as_ref(), &request, &policy).await
                });
                fut
            })
            .collect();

        // `buffered` yields in input order regardless of completion order.
        stream::iter(futs).buffered(limit).collect().await
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        if self.providers.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "parallel pipeline needs at least one provider".to_string(),
            ));
        }
        ctx.check_cancelled()?;

        let slots = self.execute_slots(ctx, &request).await;

        let mut cancellation: Option<PipelineError> = None;
        let mut successes = Vec::with_capacity(slots.len());
        let mut failures: Vec<(String, String)> = Vec::new();
        for (provider, slot) in self.providers.iter().zip(slots) {
            match slot {
                Ok(response) => successes.push(response),
                Err(e) if e.is_cancellation() => {
                    cancellation.get_or_insert(e);
                }
                Err(e) => failures.push((provider.name().to_string(), e.to_string())),
            }
        }

        if let Some(e) = cancellation {
            return Err(e);
        }
        ctx.check_cancelled()?;

        if successes.is_empty() {
            return Err(PipelineError::AllProvidersFailed {
                count: failures.len(),
                errors: failures.into_iter().map(|(_, e)| e).collect(),
            });
        }
        if !failures.is_empty() {
            tracing::warn!(
                pipeline = %self.name,
                failed = failures.len(),
                succeeded = successes.len(),
                "some providers failed; combining the rest"
            );
        }

        let inputs = successes.len();
        let mut combined = self.combiner.combine(ctx, &successes).await?;
        ctx.emit(Event::Combined {
            combiner: self.combiner.name(),
            inputs,
            selected_provider: combined.provider.clone(),
        });
        combined.set_meta("combiner", self.combiner.name());
        combined.set_meta("successful_providers", inputs);
        if !failures.is_empty() {
            combined.set_meta(
                "failed_providers",
                failures.into_iter().map(|(name, _)| name).collect::<Vec<_>>(),
            );
        }
        Ok(combined)
    }
}

impl Pipeline for ParallelPipeline {
    fn kind(&self) -> &'static str {
        "parallel"
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
    use crate::combiner::{MajorityVoteCombiner, RoundRobinCombiner};
    use crate::provider::MockProvider;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn slow(name: &str, text: &str, ms: u64) -> Arc<MockProvider> {
        Arc::new(MockProvider::fixed(name, text).with_delay(Duration::from_millis(ms)))
    }

    #[tokio::test]
    async fn test_slots_follow_provider_order_not_completion_order() {
        let pipeline = ParallelPipeline::new("fan")
            .push(slow("a", "A", 60))
            .push(slow("b", "B", 5))
            .push(slow("c", "C", 30));

        let slots = pipeline
            .execute_slots(&ExecCtx::new(), &Request::new("q"))
            .await;
        let providers: Vec<_> = slots
            .iter()
            .map(|s| s.as_ref().unwrap().provider.clone())
            .collect();
        assert_eq!(providers, vec!["a", "b", "c"]);

        let out = pipeline.execute(&ExecCtx::new(), "q").await.unwrap();
        assert_eq!(out, "A\n\nB\n\nC");
    }

    #[tokio::test]
    async fn test_runs_concurrently() {
        let pipeline = ParallelPipeline::new("fan")
            .push(slow("a", "A", 100))
            .push(slow("b", "B", 100))
            .push(slow("c", "C", 100));
        let started = std::time::Instant::now();
        pipeline.execute(&ExecCtx::new(), "q").await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(280));
    }

    #[tokio::test]
    async fn test_concurrency_limit_serializes_dispatch() {
        let pipeline = ParallelPipeline::new("fan")
            .push(slow("a", "A", 60))
            .push(slow("b", "B", 60))
            .with_options(PipelineOptions::default().with_max_concurrency(1));
        let started = std::time::Instant::now();
        let out = pipeline.execute(&ExecCtx::new(), "q").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(110));
        assert_eq!(out, "A\n\nB");
    }

    #[tokio::test]
    async fn test_execution_future_is_send() {
        let pipeline: Arc<dyn Pipeline> = Arc::new(
            ParallelPipeline::new("fan")
                .push(Arc::new(MockProvider::fixed("a", "A")))
                .push(Arc::new(MockProvider::fixed("b", "B"))),
        );
        let handle = tokio::spawn(async move {
            let ctx = ExecCtx::new();
            pipeline.execute(&ctx, "q").await
        });
        assert_eq!(handle.await.unwrap().unwrap(), "A\n\nB");
    }

    #[tokio::test]
    async fn test_failed_slots_are_omitted() {
        let pipeline = ParallelPipeline::new("fan")
            .push(Arc::new(MockProvider::fixed("a", "yes")))
            .push(Arc::new(MockProvider::failing("b", "down")))
            .push(Arc::new(MockProvider::fixed("c", "yes")))
            .with_combiner(Arc::new(MajorityVoteCombiner::new()));

        let resp = pipeline
            .execute_with_request(&ExecCtx::new(), Request::new("q"))
            .await
            .unwrap();
        assert_eq!(resp.content, "yes");
        assert_eq!(resp.meta("total_responses"), Some(&json!(2)));
        assert_eq!(resp.meta("failed_providers"), Some(&json!(["b"])));
    }

    #[tokio::test]
    async fn test_all_failed_is_aggregate_error() {
        let pipeline = ParallelPipeline::new("fan")
            .push(Arc::new(MockProvider::failing("a", "down")))
            .push(Arc::new(MockProvider::failing("b", "gone")));
        let err = pipeline.execute(&ExecCtx::new(), "q").await.unwrap_err();
        match err {
            PipelineError::AllProvidersFailed { count, errors } => {
                assert_eq!(count, 2);
                assert!(errors[0].contains("down"));
                assert!(errors[1].contains("gone"));
            }
            other => panic!("expected AllProvidersFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_calls_nothing() {
        let cancel = Arc::new(AtomicBool::new(true));
        let ctx = ExecCtx::builder().cancellation(cancel).build();
        let mock = Arc::new(MockProvider::fixed("a", "x"));
        let pipeline = ParallelPipeline::new("fan").push(mock.clone());
        let err = pipeline.execute(&ctx, "q").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_flight_drains_then_reports_cancelled() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecCtx::builder().cancellation(cancel.clone()).build();
        let first = slow("a", "A", 50);
        let second = slow("b", "B", 50);
        let pipeline = ParallelPipeline::new("fan")
            .push(first.clone())
            .push(second.clone())
            .with_options(PipelineOptions::default().with_max_concurrency(1));

        let flag = cancel.clone();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::Relaxed);
        });
        let err = pipeline.execute(&ctx, "q").await.unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test]
    async fn test_round_robin_rotates_between_executions() {
        let pipeline = ParallelPipeline::new("lb")
            .push(Arc::new(MockProvider::fixed("a", "A")))
            .push(Arc::new(MockProvider::fixed("b", "B")))
            .with_combiner(Arc::new(RoundRobinCombiner::new()));
        let ctx = ExecCtx::new();
        assert_eq!(pipeline.execute(&ctx, "q").await.unwrap(), "A");
        assert_eq!(pipeline.execute(&ctx, "q").await.unwrap(), "B");
        assert_eq!(pipeline.execute(&ctx, "q").await.unwrap(), "A");
    }

    #[tokio::test]
    async fn test_empty_parallel_fails() {
        let err = ParallelPipeline::new("none")
            .execute(&ExecCtx::new(), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
