use super::{ensure_not_empty, numbered_candidates, sources, ResultCombiner};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::provider::Provider;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::types::{Request, Response};
use async_trait::async_trait;
use std::sync::Arc;

/// Asks an evaluator provider to synthesize one answer from all responses.
///
/// A single response is returned unchanged. Evaluator failure is a hard
/// error; there is no fallback to one of the inputs.
pub struct ConsensusCombiner {
    evaluator: Arc<dyn Provider>,
    temperature: f64,
}

impl ConsensusCombiner {
    pub fn new(evaluator: Arc<dyn Provider>) -> Self {
        Self {
            evaluator,
            temperature: 0.3,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn evaluator(&self) -> &str {
        self.evaluator.name()
    }
}

fn synthesis_prompt(results: &[Response]) -> String {
    format!(
        "Several assistants answered the same request. Their responses follow.\n\n\
         {}\n\n\
         Write a single response that captures the points they agree on, resolves \
         any disagreements with the best-supported position, and keeps the most \
         useful details from each. Reply with the combined response only.",
        numbered_candidates(results)
    )
}

#[async_trait]
impl ResultCombiner for ConsensusCombiner {
    fn name(&self) -> &'static str {
        "consensus"
    }

    async fn combine(&self, ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        if results.len() == 1 {
            return Ok(results[0].clone());
        }

        let request = Request::new(synthesis_prompt(results)).with_temperature(self.temperature);
        let mut merged = call_with_retry(ctx, self.evaluator.as_ref(), &request, &RetryPolicy::none())
            .await
            .map_err(|e| {
                if e.is_cancellation() {
                    e
                } else {
                    PipelineError::Combine(format!(
                        "consensus evaluator '{}' failed: {}",
                        self.evaluator.name(),
                        e
                    ))
                }
            })?;

        merged.set_meta("consensus_from", results.len());
        merged.set_meta("sources", sources(results));
        merged.set_meta("method", "ai_synthesis");
        Ok(merged)
    }
}

impl std::fmt::Debug for ConsensusCombiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusCombiner")
            .field("evaluator", &self.evaluator.name())
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::testutil::responses;
    use crate::provider::MockProvider;
    use serde_json::json;

    #[tokio::test]
    async fn test_single_result_passes_through_without_call() {
        let judge = Arc::new(MockProvider::fixed("judge", "merged"));
        let combiner = ConsensusCombiner::new(judge.clone());
        let out = combiner
            .combine(&ExecCtx::new(), &responses(&["only"]))
            .await
            .unwrap();
        assert_eq!(out.content, "only");
        assert_eq!(judge.call_count(), 0);
    }

    #[tokio::test]
    async fn test_consensus_asks_evaluator() {
        let judge = Arc::new(MockProvider::fixed("judge", "merged answer"));
        let combiner = ConsensusCombiner::new(judge.clone());
        let out = combiner
            .combine(&ExecCtx::new(), &responses(&["first view", "second view"]))
            .await
            .unwrap();

        assert_eq!(out.content, "merged answer");
        assert_eq!(out.meta("consensus_from"), Some(&json!(2)));
        assert_eq!(out.meta("sources"), Some(&json!(["p1", "p2"])));
        assert_eq!(out.meta("method"), Some(&json!("ai_synthesis")));

        let prompt = &judge.prompts()[0];
        assert!(prompt.contains("[p1]\nfirst view"));
        assert!(prompt.contains("[p2]\nsecond view"));
        assert_eq!(judge.temperatures(), vec![0.3]);
    }

    #[tokio::test]
    async fn test_evaluator_failure_is_fatal() {
        let judge = Arc::new(MockProvider::failing("judge", "overloaded"));
        let err = ConsensusCombiner::new(judge)
            .combine(&ExecCtx::new(), &responses(&["a", "b"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Combine(ref m) if m.contains("judge")));
    }
}
