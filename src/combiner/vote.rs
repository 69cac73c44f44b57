use super::{ensure_not_empty, ResultCombiner};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::Response;
use async_trait::async_trait;

/// Groups responses by exact trimmed text and returns the largest group.
///
/// Ties between groups go to the group that appeared first. The returned
/// response is the first member of the winning group.
#[derive(Debug, Clone, Default)]
pub struct MajorityVoteCombiner;

impl MajorityVoteCombiner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResultCombiner for MajorityVoteCombiner {
    fn name(&self) -> &'static str {
        "majority"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;

        // (normalized text, index of first member, votes), in first-seen order
        let mut groups: Vec<(&str, usize, usize)> = Vec::new();
        for (idx, r) in results.iter().enumerate() {
            let key = r.content.trim();
            match groups.iter_mut().find(|(k, _, _)| *k == key) {
                Some(group) => group.2 += 1,
                None => groups.push((key, idx, 1)),
            }
        }

        let mut winner = 0;
        let mut votes = 0;
        for &(_, idx, count) in &groups {
            if count > votes {
                winner = idx;
                votes = count;
            }
        }

        let total = results.len();
        let mut selected = results[winner].clone();
        selected.set_meta("votes", votes);
        selected.set_meta("total_responses", total);
        selected.set_meta("consensus_ratio", votes as f64 / total as f64);
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::testutil::responses;
    use serde_json::json;

    #[tokio::test]
    async fn test_majority_vote() {
        let out = MajorityVoteCombiner::new()
            .combine(&ExecCtx::new(), &responses(&["x", "x", "y"]))
            .await
            .unwrap();
        assert_eq!(out.content, "x");
        assert_eq!(out.provider, "p1");
        assert_eq!(out.meta("votes"), Some(&json!(2)));
        assert_eq!(out.meta("total_responses"), Some(&json!(3)));
        let ratio = out.meta("consensus_ratio").and_then(|v| v.as_f64()).unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_majority_groups_trimmed_text() {
        let out = MajorityVoteCombiner::new()
            .combine(&ExecCtx::new(), &responses(&["y", " x ", "x\n"]))
            .await
            .unwrap();
        assert_eq!(out.provider, "p2");
        assert_eq!(out.meta("votes"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_majority_tie_goes_to_first_group() {
        let out = MajorityVoteCombiner::new()
            .combine(&ExecCtx::new(), &responses(&["a", "b", "b", "a"]))
            .await
            .unwrap();
        assert_eq!(out.content, "a");
    }
}
