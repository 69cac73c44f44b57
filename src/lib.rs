//! # LLM Orchestra
//!
//! Composable execution graphs over interchangeable LLM providers.
//!
//! A [`Pipeline`] takes a prompt and returns one response. Pipelines come in
//! several shapes (serial chains, parallel fan-out with a result combiner,
//! multi-round collaborative discussion, nesting, transforms, failover) and
//! every shape can be a stage of another. Topologies can also be described
//! declaratively as [`PipelineConfig`]s, stored in a JSON file, and rebuilt by
//! a [`ConfigFactory`].
//!
//! This crate does not talk to any LLM vendor itself. Implement [`Provider`]
//! for your backend, register it in a [`ProviderRegistry`], and refer to it by
//! name.
//!
//! ## Core Concepts
//!
//! - **[`Provider`]**: one LLM backend. [`MockProvider`] is a scripted test double.
//! - **[`Pipeline`]**: object-safe trait implemented by every variant in
//!   [`pipeline`].
//! - **[`ResultCombiner`]**: reduces parallel responses to one (see [`combiner`]).
//! - **[`ExecCtx`]**: caller-owned cancellation flag, deadline, template
//!   vars, and event handler, passed to every call.
//! - **[`PipelineOptions`]**: retries, temperatures, concurrency limit.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use llm_orchestra::{ExecCtx, MockProvider, ParallelPipeline, Pipeline};
//! use llm_orchestra::combiner::MajorityVoteCombiner;
//!
//! # tokio_test::block_on(async {
//! let pipeline = ParallelPipeline::new("vote")
//!     .push(Arc::new(MockProvider::fixed("a", "Paris")))
//!     .push(Arc::new(MockProvider::fixed("b", "Paris")))
//!     .push(Arc::new(MockProvider::fixed("c", "Lyon")))
//!     .with_combiner(Arc::new(MajorityVoteCombiner::new()));
//!
//! let answer = pipeline
//!     .execute(&ExecCtx::new(), "Capital of France?")
//!     .await
//!     .unwrap();
//! assert_eq!(answer, "Paris");
//! # });
//! ```
//!
//! ## From a stored config
//!
//! ```no_run
//! use std::sync::Arc;
//! use llm_orchestra::{ConfigFactory, ConfigStore, ExecCtx, Pipeline, PipelineConfig, PipelineType};
//! use llm_orchestra::provider::{MockProvider, ProviderRegistry};
//!
//! # async fn run() -> llm_orchestra::Result<()> {
//! let providers = Arc::new(ProviderRegistry::new());
//! providers.register(Arc::new(MockProvider::echo("drafter")));
//! providers.register(Arc::new(MockProvider::fixed("editor", "done")));
//!
//! let factory = ConfigFactory::new(providers)
//!     .with_store(ConfigStore::new("pipelines.json"));
//! factory.save_config(
//!     &PipelineConfig::new("edit", PipelineType::Serial).with_providers(["drafter", "editor"]),
//! )?;
//!
//! let pipeline = factory.create_from_config("edit")?;
//! let text = pipeline.execute(&ExecCtx::new(), "Write a haiku").await?;
//! println!("{text}");
//! # Ok(())
//! # }
//! ```

pub mod combiner;
pub mod config;
pub mod error;
pub mod events;
pub mod exec_ctx;
pub mod options;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod types;

pub use combiner::{CombinerRegistry, ResultCombiner};
pub use config::{
    ConfigFactory, ConfigStore, PipelineConfig, PipelineConfigs, PipelineStageConfig,
    PipelineType, ProviderConfig,
};
pub use error::{PipelineError, Result};
pub use events::{Event, EventHandler, FnEventHandler};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use options::{HaMode, PipelineOptions};
pub use pipeline::{
    BoxFut, CollaborativePipeline, HighAvailabilityPipeline, NestedPipeline, ParallelPipeline,
    Pipeline, SerialPipeline, SimplePipeline, Transform, TransformPipeline,
};
pub use provider::{Capability, MockProvider, PipelineProvider, Provider, ProviderRegistry};
pub use retry::{call_with_retry, RetryPolicy};
pub use types::{FunctionRegistry, ProviderResponse, Request, Response, Usage};
