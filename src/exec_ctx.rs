//! Execution context shared across pipeline invocations.
//!
//! [`ExecCtx`] carries the caller's cancellation flag, an optional deadline,
//! template variables, and an optional event handler. It is constructed once
//! by the caller and passed by reference through every pipeline, provider, and
//! combiner call. The orchestration layer never imposes a timeout of its own.

use crate::error::{PipelineError, Result};
use crate::events::{Event, EventHandler};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::Instant;

/// Shared execution context for pipeline invocations.
///
/// # Example
///
/// ```
/// use llm_orchestra::ExecCtx;
/// use std::time::Duration;
///
/// let ctx = ExecCtx::builder()
///     .var("audience", "researchers")
///     .timeout(Duration::from_secs(30))
///     .build();
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct ExecCtx {
    /// Template variables substituted into `{key}` placeholders by transforms.
    pub vars: HashMap<String, String>,
    /// Optional cancellation flag; set it to abort at the next check point.
    pub cancellation: Option<Arc<AtomicBool>>,
    /// Optional deadline applied to every provider call.
    pub deadline: Option<Instant>,
    /// Optional event handler for lifecycle events.
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtx {
    /// A context with no cancellation, deadline, or handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder.
    pub fn builder() -> ExecCtxBuilder {
        ExecCtxBuilder::default()
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation was requested or the deadline passed.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(PipelineError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `fut` under this context's deadline, if any.
    pub async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| PipelineError::DeadlineExceeded)?,
            None => fut.await,
        }
    }

    /// Forward an event to the handler, if one is set.
    pub fn emit(&self, event: Event) {
        if let Some(ref h) = self.event_handler {
            h.on_event(event);
        }
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("vars_count", &self.vars.len())
            .field("has_cancellation", &self.cancellation.is_some())
            .field("deadline", &self.deadline)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`ExecCtx`].
#[derive(Default)]
pub struct ExecCtxBuilder {
    vars: HashMap<String, String>,
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ExecCtxBuilder {
    /// Set all template variables at once.
    pub fn vars(mut self, vars: HashMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Insert a single template variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(cancel);
        self
    }

    /// Set an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to when [`build`](Self::build) is called.
    ///
    /// If both a deadline and a timeout are given, the earlier one wins.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the event handler.
    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the execution context.
    pub fn build(self) -> ExecCtx {
        let from_timeout = self.timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, from_timeout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        ExecCtx {
            vars: self.vars,
            cancellation: self.cancellation,
            deadline,
            event_handler: self.event_handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_cancelled_by_default() {
        let ctx = ExecCtx::new();
        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn test_cancel_flag_observed() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecCtx::builder().cancellation(cancel.clone()).build();
        assert!(ctx.check_cancelled().is_ok());

        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(ctx.check_cancelled(), Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_on_slow_future() {
        let ctx = ExecCtx::builder().timeout(Duration::from_millis(10)).build();
        let result: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(PipelineError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn test_run_without_deadline_passes_through() {
        let ctx = ExecCtx::new();
        let value = ctx.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_earlier_of_deadline_and_timeout_wins() {
        let soon = Instant::now() + Duration::from_millis(5);
        let ctx = ExecCtx::builder()
            .deadline(soon)
            .timeout(Duration::from_secs(60))
            .build();
        assert_eq!(ctx.deadline, Some(soon));
    }
}
