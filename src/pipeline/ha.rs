//! High availability across interchangeable providers.
//!
//! The mode is an explicit choice ([`HaMode`]): `Failover` tries providers in
//! list order and stops at the first success; `Race` dispatches all of them at
//! once and keeps the first success, dropping the rest.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::{PipelineError, Result},
    exec_ctx::ExecCtx,
    options::{HaMode, PipelineOptions},
    provider::Provider,
    retry::call_with_retry,
    types::{Request, Response},
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;

/// Answers from the first provider that succeeds, by failover or by race.
pub struct HighAvailabilityPipeline {
    name: String,
    providers: Vec<Arc<dyn Provider>>,
    options: PipelineOptions,
}

impl HighAvailabilityPipeline {
    /// Create an empty group in failover mode.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            options: PipelineOptions::default(),
        }
    }

    /// Add a provider. In failover mode, list order is try order.
    pub fn push(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set options, including the mode carried in `ha_mode`.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Override the mode.
    pub fn with_mode(mut self, mode: HaMode) -> Self {
        self.options.ha_mode = mode;
        self
    }

    /// Current mode.
    pub fn mode(&self) -> HaMode {
        self.options.ha_mode
    }

    async fn failover(&self, ctx: &ExecCtx, request: &Request) -> Result<Response> {
        let policy = self.options.retry_policy();
        let mut attempted = Vec::new();
        let mut errors = Vec::new();

        for provider in &self.providers {
            ctx.check_cancelled()?;
            attempted.push(provider.name().to_string());
            match call_with_retry(ctx, provider.as_ref(), request, &policy).await {
                Ok(mut response) => {
                    response.set_meta("failover_count", errors.len());
                    response.set_meta("attempted_providers", attempted);
                    return Ok(response);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.name,
                        provider = provider.name(),
                        error = %e,
                        "provider failed; failing over"
                    );
                    errors.push(e.to_string());
                }
            }
        }

        Err(PipelineError::AllProvidersFailed {
            count: errors.len(),
            errors,
        })
    }

    async fn race(&self, ctx: &ExecCtx, request: &Request) -> Result<Response> {
        ctx.check_cancelled()?;
        let policy = self.options.retry_policy();
        let mut in_flight: FuturesUnordered<_> = self
            .providers
            .iter()
            .enumerate()
            .map(|(idx, provider)| {
                let policy = &policy;
                async move { (idx, call_with_retry(ctx, provider.as_ref(), request, policy).await) }
            })
            .collect();

        let mut errors: Vec<Option<String>> = vec![None; self.providers.len()];
        while let Some((idx, outcome)) = in_flight.next().await {
            match outcome {
                Ok(mut response) => {
                    // dropping `in_flight` abandons the slower calls
                    response.set_meta("raced_providers", self.providers.len());
                    return Ok(response);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => errors[idx] = Some(e.to_string()),
            }
        }

        let errors: Vec<String> = errors.into_iter().flatten().collect();
        Err(PipelineError::AllProvidersFailed {
            count: errors.len(),
            errors,
        })
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        if self.providers.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "ha pipeline needs at least one provider".to_string(),
            ));
        }
        let mut response = match self.options.ha_mode {
            HaMode::Failover => self.failover(ctx, &request).await?,
            HaMode::Race => self.race(ctx, &request).await?,
        };
        response.set_meta(
            "ha_mode",
            match self.options.ha_mode {
                HaMode::Failover => "failover",
                HaMode::Race => "race",
            },
        );
        Ok(response)
    }
}

impl Pipeline for HighAvailabilityPipeline {
    fn kind(&self) -> &'static str {
        "ha"
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
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_failover_in_order() {
        let primary = Arc::new(MockProvider::failing("primary", "503"));
        let backup = Arc::new(MockProvider::fixed("backup", "served"));
        let spare = Arc::new(MockProvider::fixed("spare", "unused"));
        let ha = HighAvailabilityPipeline::new("ha")
            .push(primary.clone())
            .push(backup.clone())
            .push(spare.clone());

        let resp = ha
            .execute_with_request(&ExecCtx::new(), Request::new("q"))
            .await
            .unwrap();
        assert_eq!(resp.content, "served");
        assert_eq!(resp.meta("failover_count"), Some(&json!(1)));
        assert_eq!(resp.meta("attempted_providers"), Some(&json!(["primary", "backup"])));
        assert_eq!(resp.meta("ha_mode"), Some(&json!("failover")));
        assert_eq!(spare.call_count(), 0);
    }

    #[tokio::test]
    async fn test_race_takes_first_success() {
        let slow = Arc::new(
            MockProvider::fixed("slow", "late").with_delay(Duration::from_millis(200)),
        );
        let broken = Arc::new(MockProvider::failing("broken", "down"));
        let quick = Arc::new(
            MockProvider::fixed("quick", "early").with_delay(Duration::from_millis(10)),
        );
        let ha = HighAvailabilityPipeline::new("ha")
            .push(slow.clone())
            .push(broken)
            .push(quick)
            .with_mode(HaMode::Race);

        let started = std::time::Instant::now();
        let resp = ha
            .execute_with_request(&ExecCtx::new(), Request::new("q"))
            .await
            .unwrap();
        assert_eq!(resp.content, "early");
        assert_eq!(resp.provider, "quick");
        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(slow.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_fail_in_either_mode() {
        for mode in [HaMode::Failover, HaMode::Race] {
            let ha = HighAvailabilityPipeline::new("ha")
                .push(Arc::new(MockProvider::failing("a", "x")))
                .push(Arc::new(MockProvider::failing("b", "y")))
                .with_mode(mode);
            let err = ha.execute(&ExecCtx::new(), "q").await.unwrap_err();
            match err {
                PipelineError::AllProvidersFailed { count, errors } => {
                    assert_eq!(count, 2);
                    assert!(errors[0].contains("'a'"));
                    assert!(errors[1].contains("'b'"));
                }
                other => panic!("expected AllProvidersFailed, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_empty_ha_fails() {
        let err = HighAvailabilityPipeline::new("ha")
            .execute(&ExecCtx::new(), "q")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
