//! Selection by a panel of juror providers.
//!
//! Each juror sees the numbered candidates and answers with the number of the
//! best one. Votes are tallied under a [`VotingRule`]. A juror reply without a
//! valid candidate number abstains; a juror call that fails is a hard error.

use super::{ensure_not_empty, numbered_candidates, ResultCombiner};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::provider::Provider;
use crate::retry::{call_with_retry, RetryPolicy};
use crate::types::{Request, Response};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// How juror votes decide the winner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingRule {
    /// Most votes wins; ties go to the earliest candidate.
    #[default]
    Plurality,
    /// A candidate needs more than half of the cast votes.
    Majority,
}

impl FromStr for VotingRule {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "plurality" => Ok(VotingRule::Plurality),
            "majority" => Ok(VotingRule::Majority),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown voting rule '{}' (expected 'plurality' or 'majority')",
                other
            ))),
        }
    }
}

/// Picks the response a panel of jurors votes for.
pub struct JuryCombiner {
    jurors: Vec<Arc<dyn Provider>>,
    rule: VotingRule,
}

impl JuryCombiner {
    pub fn new(jurors: Vec<Arc<dyn Provider>>, rule: VotingRule) -> Self {
        Self { jurors, rule }
    }

    pub fn rule(&self) -> VotingRule {
        self.rule
    }
}

fn ballot(results: &[Response]) -> String {
    format!(
        "You are a juror judging candidate responses to the same request.\n\n\
         {}\n\n\
         Which candidate is the most accurate and helpful? \
         Answer with the candidate number only (1-{}).",
        numbered_candidates(results),
        results.len()
    )
}

/// The first integer in `reply` that names a candidate (1-based), as an index.
fn parse_vote(reply: &str, candidates: usize) -> Option<usize> {
    reply
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<usize>().ok())
        .find(|n| (1..=candidates).contains(n))
        .map(|n| n - 1)
}

#[async_trait]
impl ResultCombiner for JuryCombiner {
    fn name(&self) -> &'static str {
        "jury"
    }

    async fn combine(&self, ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        if self.jurors.is_empty() {
            return Err(PipelineError::Combine("jury: no jurors configured".into()));
        }
        if results.len() == 1 {
            return Ok(results[0].clone());
        }

        let request = Request::new(ballot(results)).with_temperature(0.0);
        let policy = RetryPolicy::none();
        let replies = join_all(
            self.jurors
                .iter()
                .map(|juror| call_with_retry(ctx, juror.as_ref(), &request, &policy)),
        )
        .await;

        let mut tally = vec![0usize; results.len()];
        let mut cast = 0usize;
        for (juror, reply) in self.jurors.iter().zip(replies) {
            let reply = reply.map_err(|e| {
                if e.is_cancellation() {
                    e
                } else {
                    PipelineError::Combine(format!("juror '{}' failed: {}", juror.name(), e))
                }
            })?;
            match parse_vote(&reply.content, results.len()) {
                Some(idx) => {
                    tally[idx] += 1;
                    cast += 1;
                }
                None => tracing::warn!(juror = juror.name(), "juror abstained"),
            }
        }

        if cast == 0 {
            return Err(PipelineError::Combine("jury: no valid votes cast".into()));
        }

        let mut winner = 0;
        for (idx, votes) in tally.iter().enumerate() {
            if *votes > tally[winner] {
                winner = idx;
            }
        }
        if self.rule == VotingRule::Majority && tally[winner] * 2 <= cast {
            return Err(PipelineError::Combine(format!(
                "jury: no majority ({} of {} votes for the leading candidate)",
                tally[winner], cast
            )));
        }

        let mut selected = results[winner].clone();
        selected.set_meta("jury_votes", tally);
        selected.set_meta(
            "jurors",
            self.jurors
                .iter()
                .map(|j| j.name().to_string())
                .collect::<Vec<_>>(),
        );
        Ok(selected)
    }
}

impl std::fmt::Debug for JuryCombiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JuryCombiner")
            .field(
                "jurors",
                &self.jurors.iter().map(|j| j.name()).collect::<Vec<_>>(),
            )
            .field("rule", &self.rule)
            .finish()
    }
}
