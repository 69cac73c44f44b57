//! Strategies that reduce several responses to one.
//!
//! A [`ParallelPipeline`](crate::pipeline::ParallelPipeline) hands its
//! successful responses, in provider order, to a [`ResultCombiner`]. Every
//! strategy fails on an empty input rather than inventing an empty response,
//! and records how it decided in the result's metadata.
//!
//! | Name | Strategy |
//! |---|---|
//! | `concat` | [`ConcatCombiner`] |
//! | `majority` | [`MajorityVoteCombiner`] |
//! | `first` | [`FirstSuccessfulCombiner`] |
//! | `longest` | [`LongestResponseCombiner`] |
//! | `round_robin` | [`RoundRobinCombiner`] |
//! | `random` | [`RandomCombiner`] |
//! | `consensus` | [`ConsensusCombiner`] |
//! | `weighted` | [`WeightedCombiner`] |
//! | `quality` | [`QualityScoreCombiner`] |
//! | `jury` | [`JuryCombiner`] |

pub mod concat;
pub mod consensus;
pub mod jury;
pub mod quality;
pub mod registry;
pub mod select;
pub mod vote;

pub use concat::ConcatCombiner;
pub use consensus::ConsensusCombiner;
pub use jury::{JuryCombiner, VotingRule};
pub use quality::QualityScoreCombiner;
pub use registry::{CombinerConstructor, CombinerParams, CombinerRegistry};
pub use select::{
    FirstSuccessfulCombiner, LongestResponseCombiner, RandomCombiner, RoundRobinCombiner,
    WeightedCombiner,
};
pub use vote::MajorityVoteCombiner;

use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::Response;
use async_trait::async_trait;

/// Reduces an ordered list of responses to a single response.
#[async_trait]
pub trait ResultCombiner: Send + Sync {
    /// Registry name of the strategy.
    fn name(&self) -> &'static str;

    /// Combine `results`, which arrive in provider order.
    async fn combine(&self, ctx: &ExecCtx, results: &[Response]) -> Result<Response>;
}

/// Fail with a combine error when there is nothing to combine.
pub(crate) fn ensure_not_empty(strategy: &str, results: &[Response]) -> Result<()> {
    if results.is_empty() {
        return Err(PipelineError::Combine(format!(
            "{}: no results to combine",
            strategy
        )));
    }
    Ok(())
}

/// Provider names of `results`, in order.
pub(crate) fn sources(results: &[Response]) -> Vec<String> {
    results.iter().map(|r| r.provider.clone()).collect()
}

/// Render the candidates as a numbered list for evaluator prompts.
pub(crate) fn numbered_candidates(results: &[Response]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. [{}]\n{}", i + 1, r.provider, r.content.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}
