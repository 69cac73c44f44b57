use super::{ensure_not_empty, ResultCombiner};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::Response;
use async_trait::async_trait;

/// Scores each response 0-100 on shape heuristics and returns the best.
///
/// - up to 50 points for length, full credit at 4x `min_length`
/// - 20 points for more than one paragraph
/// - 15 points for list markup
/// - 15 points for a fenced code block
#[derive(Debug, Clone)]
pub struct QualityScoreCombiner {
    min_length: usize,
}

impl Default for QualityScoreCombiner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MIN_LENGTH)
    }
}

impl QualityScoreCombiner {
    pub const DEFAULT_MIN_LENGTH: usize = 50;

    pub fn new(min_length: usize) -> Self {
        Self {
            min_length: min_length.max(1),
        }
    }

    pub fn score(&self, content: &str) -> f64 {
        let text = content.trim();
        let len = text.chars().count() as f64;
        let full = (self.min_length * 4) as f64;
        let mut score = 50.0 * (len / full).min(1.0);

        if text.contains("\n\n") {
            score += 20.0;
        }
        if has_list(text) {
            score += 15.0;
        }
        if text.contains("```") {
            score += 15.0;
        }
        score
    }
}

fn has_list(text: &str) -> bool {
    text.lines().map(str::trim_start).any(|line| {
        if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ") {
            return true;
        }
        let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
        let rest = &line[digits..];
        digits > 0 && (rest.starts_with(". ") || rest.starts_with(") "))
    })
}

#[async_trait]
impl ResultCombiner for QualityScoreCombiner {
    fn name(&self) -> &'static str {
        "quality"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;
        let mut best = &results[0];
        let mut best_score = self.score(&best.content);
        for r in &results[1..] {
            let s = self.score(&r.content);
            if s > best_score {
                best = r;
                best_score = s;
            }
        }
        Ok(best.clone().with_meta("quality_score", best_score))
    }
}
