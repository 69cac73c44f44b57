//! Provider trait and capability flags.
//!
//! A [`Provider`] is the external collaborator that actually talks to an LLM.
//! This crate never constructs one itself: callers register providers (or
//! provider factories) in a [`ProviderRegistry`] and pipelines look them up by
//! name at build time.
//!
//! ```text
//! Pipeline ──► call_with_retry ──► Provider::generate_response() ──► Response
//!                                        │
//!                      ┌─────────────────┼──────────────────┐
//!                 your backend     MockProvider     PipelineProvider
//!                                                  (a pipeline in a
//!                                                   provider slot)
//! ```

pub mod adapter;
pub mod mock;
pub mod registry;

pub use adapter::PipelineProvider;
pub use mock::MockProvider;
pub use registry::{OverriddenProvider, ProviderFactory, ProviderRegistry};

use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::{Request, Response};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A feature a provider supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FunctionCalling,
    Streaming,
    Vision,
}

/// Set of capabilities advertised by a provider.
pub type Capabilities = BTreeSet<Capability>;

/// Abstraction over LLM backends.
///
/// Implementations should honor the request's temperature and token budget
/// and return a [`PipelineError::Provider`](crate::PipelineError::Provider)
/// (or any other error) on failure. Deadlines are enforced by the caller.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate a complete response.
    async fn generate_response(&self, ctx: &ExecCtx, request: &Request) -> Result<Response>;

    /// Generate a response, delivering chunks to `on_chunk` as they arrive.
    ///
    /// The default implementation generates the whole response and delivers
    /// it as a single chunk.
    async fn generate_streaming_response(
        &self,
        ctx: &ExecCtx,
        request: &Request,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<()> {
        let response = self.generate_response(ctx, request).await?;
        on_chunk(response.content);
        Ok(())
    }

    /// Registry name of this provider.
    fn name(&self) -> &str;

    /// Model identifier this provider talks to.
    fn model(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::new()
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}
