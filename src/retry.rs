//! Bounded retry for provider calls.
//!
//! Every pipeline funnels its provider calls through [`call_with_retry`]: an
//! explicit attempt counter, a cancellation check before each attempt, an
//! optional exponential delay between attempts, and the context deadline
//! applied to each call.

use crate::{
    error::{PipelineError, Result},
    events::Event,
    exec_ctx::ExecCtx,
    provider::Provider,
    types::{Request, Response},
};
use std::time::Duration;

/// How many times to call a provider and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Delay grows: initial, initial * multiplier, initial * multiplier^2, ...
    pub multiplier: f64,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A single attempt.
    pub fn none() -> Self {
        Self::attempts(1)
    }

    /// Up to `n` attempts with no delay between them.
    pub fn attempts(n: u32) -> Self {
        Self {
            max_attempts: n.max(1),
            initial_delay: Duration::ZERO,
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn with_delay(mut self, initial: Duration) -> Self {
        self.initial_delay = initial;
        self
    }

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(retry as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

/// Call `provider` with `request`, retrying per `policy`.
///
/// Cancellation and deadline errors are returned immediately and never
/// retried. So are errors that are not [retryable](PipelineError::is_retryable),
/// such as a combine failure from a pipeline in a provider slot; those come
/// back unchanged. Transport failures are retried until attempts run out and
/// the last one is returned as a [`PipelineError::Provider`] naming the provider.
pub async fn call_with_retry(
    ctx: &ExecCtx,
    provider: &dyn Provider,
    request: &Request,
    policy: &RetryPolicy,
) -> Result<Response> {
    let name = provider.name().to_string();
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<PipelineError> = None;

    for attempt in 1..=attempts {
        ctx.check_cancelled()?;

        if attempt > 1 {
            let delay = policy.delay_for_retry(attempt - 2);
            let reason = last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            tracing::warn!(provider = %name, attempt, ?delay, %reason, "retrying provider call");
            ctx.emit(Event::ProviderRetry {
                provider: name.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                reason,
            });
            if !delay.is_zero() {
                ctx.run(async {
                    tokio::time::sleep(delay).await;
                    Ok(())
                })
                .await?;
                ctx.check_cancelled()?;
            }
        }

        match ctx.run(provider.generate_response(ctx, request)).await {
            Ok(mut response) => {
                if response.provider.is_empty() {
                    response.provider = name.clone();
                }
                return Ok(response);
            }
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) if !e.is_retryable() => {
                ctx.emit(Event::ProviderFailed {
                    provider: name,
                    reason: e.to_string(),
                });
                return Err(e);
            }
            Err(e) => last_error = Some(e),
        }
    }

    let err = match last_error {
        Some(e @ PipelineError::Provider { .. }) => e,
        Some(e) => PipelineError::provider(&name, e.to_string()),
        None => PipelineError::provider(&name, "no attempt was made"),
    };
    ctx.emit(Event::ProviderFailed {
        provider: name,
        reason: err.to_string(),
    });
    Err(err)
}
