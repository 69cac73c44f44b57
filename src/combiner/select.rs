//! Combiners that pick one response without looking at its content's meaning.

use super::{ensure_not_empty, ResultCombiner};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::Response;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Returns the first response with non-empty content.
#[derive(Debug, Clone, Default)]
pub struct FirstSuccessfulCombiner;

#[async_trait]
impl ResultCombiner for FirstSuccessfulCombiner {
    fn name(&self) -> &'static str {
        "first"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        results
            .iter()
            .find(|r| !r.content.trim().is_empty())
            .cloned()
            .ok_or_else(|| PipelineError::Combine("first: every result was empty".to_string()))
    }
}

/// Returns the longest response. Ties go to the earliest.
#[derive(Debug, Clone, Default)]
pub struct LongestResponseCombiner;

#[async_trait]
impl ResultCombiner for LongestResponseCombiner {
    fn name(&self) -> &'static str {
        "longest"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        let mut best = &results[0];
        for r in &results[1..] {
            if r.content.chars().count() > best.content.chars().count() {
                best = r;
            }
        }
        Ok(best.clone().with_meta("length", best.content.chars().count()))
    }
}

/// Rotates through result slots across calls, for load distribution.
///
/// The counter is shared by every execution of the pipeline that owns this
/// combiner and advances atomically, so concurrent executions each get a
/// distinct index.
#[derive(Debug, Default)]
pub struct RoundRobinCombiner {
    counter: AtomicUsize,
}

impl RoundRobinCombiner {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultCombiner for RoundRobinCombiner {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        let idx = self.counter.fetch_add(1, Ordering::SeqCst) % results.len();
        Ok(results[idx].clone().with_meta("selected_index", idx))
    }
}

/// Picks a uniformly random response.
#[derive(Debug, Clone, Default)]
pub struct RandomCombiner;

#[async_trait]
impl ResultCombiner for RandomCombiner {
    fn name(&self) -> &'static str {
        "random"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        let idx = fastrand::usize(..results.len());
        Ok(results[idx].clone().with_meta("selected_index", idx))
    }
}

/// Returns the response of the highest-weighted provider.
///
/// Providers without an explicit weight get [`WeightedCombiner::DEFAULT_WEIGHT`].
/// Ties go to the earliest response.
#[derive(Debug, Clone, Default)]
pub struct WeightedCombiner {
    weights: HashMap<String, f64>,
}

impl WeightedCombiner {
    pub const DEFAULT_WEIGHT: f64 = 1.0;

    pub fn new(weights: HashMap<String, f64>) -> Self {
        Self { weights }
    }

    pub fn with_weight(mut self, provider: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(provider.into(), weight);
        self
    }

    pub fn weight_of(&self, provider: &str) -> f64 {
        self.weights
            .get(provider)
            .copied()
            .unwrap_or(Self::DEFAULT_WEIGHT)
    }
}

#[async_trait]
impl ResultCombiner for WeightedCombiner {
    fn name(&self) -> &'static str {
        "weighted"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        let mut best = &results[0];
        let mut best_weight = self.weight_of(&best.provider);
        for r in &results[1..] {
            let w = self.weight_of(&r.provider);
            if w > best_weight {
                best = r;
                best_weight = w;
            }
        }
        Ok(best.clone().with_meta("selected_weight", best_weight))
    }
}
