//! A sequential chain of sub-pipelines.
//!
//! Same contract as [`SerialPipeline`](super::SerialPipeline), one level up:
//! stage *i*'s output text is stage *i+1*'s prompt, and the first failing
//! stage stops the chain. Stages can be any [`Pipeline`], including other
//! nested pipelines.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::{PipelineError, Result},
    events::Event,
    exec_ctx::ExecCtx,
    types::{Request, Response, Usage},
};
use std::sync::Arc;

/// A chain of sub-pipelines; each stage's output is the next stage's input.
pub struct NestedPipeline {
    name: String,
    stages: Vec<Arc<dyn Pipeline>>,
}

impl NestedPipeline {
    /// Create an empty chain.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage (builder style).
    pub fn push(mut self, stage: Arc<dyn Pipeline>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a stage (mutation style).
    pub fn add(&mut self, stage: Arc<dyn Pipeline>) {
        self.stages.push(stage);
    }

    /// Stages in execution order.
    pub fn stages(&self) -> &[Arc<dyn Pipeline>] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the chain has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "nested pipeline needs at least one stage".to_string(),
            ));
        }

        let mut current = request;
        let mut usage: Option<Usage> = None;
        let mut last: Option<Response> = None;

        for (idx, stage) in self.stages.iter().enumerate() {
            let n = idx + 1;
            ctx.check_cancelled()?;
            ctx.emit(Event::StageStart {
                pipeline: self.name.clone(),
                stage: n,
                name: stage.name().to_string(),
            });

            let result = stage.execute_with_request(ctx, current.clone()).await;
            ctx.emit(Event::StageEnd {
                pipeline: self.name.clone(),
                stage: n,
                name: stage.name().to_string(),
                ok: result.is_ok(),
            });
            let response = result.map_err(|e| e.in_stage(n, stage.name()))?;

            if let Some(u) = &response.usage {
                usage.get_or_insert_with(Usage::default).add(u);
            }
            current = current.with_prompt(response.content.clone());
            last = Some(response);
        }

        let mut response = last
            .ok_or_else(|| PipelineError::Other("nested pipeline produced no output".into()))?;
        response.usage = usage;
        response.set_meta("stages", self.stages.len());
        Ok(response)
    }
}

impl Pipeline for NestedPipeline {
    fn kind(&self) -> &'static str {
        "nested"
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

impl std::fmt::Debug for NestedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NestedPipeline")
            .field("name", &self.name)
            .field(
                "stages",
                &self.stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
