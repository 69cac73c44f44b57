use super::{ensure_not_empty, sources, ResultCombiner};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::{Response, Usage};
use async_trait::async_trait;

pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// Joins every non-empty response with a separator and sums token usage.
#[derive(Debug, Clone)]
pub struct ConcatCombiner {
    separator: String,
}

impl Default for ConcatCombiner {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR)
    }
}

impl ConcatCombiner {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            separator: separator.into(),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }
}

#[async_trait]
impl ResultCombiner for ConcatCombiner {
    fn name(&self) -> &'static str {
        "concat"
    }

    async fn combine(&self, _ctx: &ExecCtx, results: &[Response]) -> Result<Response> {
        ensure_not_empty(self.name(), results)?;

        let included: Vec<&Response> = results
            .iter()
            .filter(|r| !r.content.trim().is_empty())
            .collect();
        if included.is_empty() {
            return Err(PipelineError::Combine(
                "concat: every result was empty".to_string(),
            ));
        }

        let content = included
            .iter()
            .map(|r| r.content.as_str())
            .collect::<Vec<_>>()
            .join(&self.separator);

        let mut usage: Option<Usage> = None;
        for u in included.iter().filter_map(|r| r.usage.as_ref()) {
            usage.get_or_insert_with(Usage::default).add(u);
        }

        let kept: Vec<Response> = included.into_iter().cloned().collect();
        let mut combined = Response::new("concat", content).with_meta("source_count", kept.len());
        combined.set_meta("sources", sources(&kept));
        combined.usage = usage;
        Ok(combined)
    }
}
