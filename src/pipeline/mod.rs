//! The composable pipeline trait and its variants.
//!
//! Every variant implements [`Pipeline`], so any pipeline can be a stage of a
//! [`NestedPipeline`] or, through
//! [`PipelineProvider`](crate::provider::PipelineProvider), a provider slot of
//! another pipeline. A pipeline call is atomic from the caller's perspective:
//! it returns one coherent response or an error.
//!
//! | Variant | Behavior |
//! |---|---|
//! | [`SimplePipeline`] | one provider |
//! | [`SerialPipeline`] | output of provider *i* is input of provider *i+1* |
//! | [`ParallelPipeline`] | fan out to N providers, combine the successes |
//! | [`CollaborativePipeline`] | multi-round discussion, then a synthesis |
//! | [`NestedPipeline`] | sequential chain of sub-pipelines |
//! | [`TransformPipeline`] | rewrite input and/or output around a base pipeline |
//! | [`HighAvailabilityPipeline`] | failover or race across providers |

pub mod collaborative;
pub mod ha;
pub mod nested;
pub mod parallel;
pub mod serial;
pub mod simple;
pub mod transform;

pub use collaborative::{CollaborativePipeline, Discussion};
pub use ha::HighAvailabilityPipeline;
pub use nested::NestedPipeline;
pub use parallel::ParallelPipeline;
pub use serial::SerialPipeline;
pub use simple::SimplePipeline;
pub use transform::{Transform, TransformPipeline};

use crate::error::Result;
use crate::events::Event;
use crate::exec_ctx::ExecCtx;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed, pinned, Send future -- the return type of pipeline execution.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe trait for executable pipelines.
///
/// The trait is object-safe so pipelines can be stored as `Arc<dyn Pipeline>`
/// and nested without generic constraints. A built pipeline holds no session
/// state and may be executed any number of times, concurrently.
pub trait Pipeline: Send + Sync {
    /// Stable identifier for the variant (e.g. `"serial"`, `"parallel"`).
    fn kind(&self) -> &'static str;

    /// Instance name (for logging, events, and error messages).
    fn name(&self) -> &str;

    /// Execute with full request settings, returning a response with metadata.
    fn execute_with_request<'a>(
        &'a self,
        ctx: &'a ExecCtx,
        request: Request,
    ) -> BoxFut<'a, Result<Response>>;

    /// Execute on a plain prompt, returning only the output text.
    fn execute<'a>(&'a self, ctx: &'a ExecCtx, input: &'a str) -> BoxFut<'a, Result<String>> {
        Box::pin(async move {
            let response = self.execute_with_request(ctx, Request::new(input)).await?;
            Ok(response.content)
        })
    }
}

/// Run `fut` bracketed by start/end events and debug logs.
pub(crate) async fn observed<F>(
    ctx: &ExecCtx,
    kind: &'static str,
    name: &str,
    fut: F,
) -> Result<Response>
where
    F: Future<Output = Result<Response>>,
{
    tracing::debug!(pipeline = name, kind, "pipeline start");
    ctx.emit(Event::PipelineStart {
        name: name.to_string(),
        kind,
    });
    let result = fut.await;
    match &result {
        Ok(_) => tracing::debug!(pipeline = name, kind, "pipeline finished"),
        Err(e) => tracing::debug!(pipeline = name, kind, error = %e, "pipeline failed"),
    }
    ctx.emit(Event::PipelineEnd {
        name: name.to_string(),
        kind,
        ok: result.is_ok(),
    });
    result
}
