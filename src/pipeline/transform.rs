//! Input/output rewriting around a base pipeline.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::{PipelineError, Result},
    exec_ctx::ExecCtx,
    prompt,
    types::{Request, Response},
};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A text rewrite applied before or after the base pipeline.
///
/// Parsed from config strings: one of the builtins (`trim`, `lowercase`,
/// `uppercase`, `strip_code_fences`), or a template with an `{input}` slot.
#[derive(Clone)]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
    /// Remove a surrounding Markdown code fence, if any.
    StripCodeFences,
    /// Rendered with [`prompt::render`]; ctx vars fill the other placeholders.
    Template(String),
    Func(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Transform {
    /// Wrap a closure.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Transform::Func(Arc::new(f))
    }

    /// Apply to `input`; templates see `vars` as well.
    pub fn apply(&self, input: &str, vars: &HashMap<String, String>) -> String {
        match self {
            Transform::Trim => input.trim().to_string(),
            Transform::Lowercase => input.to_lowercase(),
            Transform::Uppercase => input.to_uppercase(),
            Transform::StripCodeFences => strip_code_fences(input),
            Transform::Template(template) => prompt::render(template, input, vars),
            Transform::Func(f) => f(input),
        }
    }

    /// Short label for logs and metadata.
    pub fn label(&self) -> &str {
        match self {
            Transform::Trim => "trim",
            Transform::Lowercase => "lowercase",
            Transform::Uppercase => "uppercase",
            Transform::StripCodeFences => "strip_code_fences",
            Transform::Template(_) => "template",
            Transform::Func(_) => "func",
        }
    }
}

impl FromStr for Transform {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "trim" => Ok(Transform::Trim),
            "lowercase" => Ok(Transform::Lowercase),
            "uppercase" => Ok(Transform::Uppercase),
            "strip_code_fences" => Ok(Transform::StripCodeFences),
            _ if prompt::mentions_input(s) => Ok(Transform::Template(s.to_string())),
            _ => Err(PipelineError::InvalidConfig(format!(
                "transform '{}' is neither a builtin nor a template with an {{input}} slot",
                s
            ))),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Template(t) => f.debug_tuple("Template").field(t).finish(),
            other => f.write_str(other.label()),
        }
    }
}

fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return text.to_string();
    };
    let Some(body) = body.strip_suffix("```") else {
        return text.to_string();
    };
    // drop the language tag line
    match body.split_once('\n') {
        Some((_, rest)) => rest.trim_end().to_string(),
        None => body.trim().to_string(),
    }
}

/// Runs a base pipeline with optional input and output rewrites.
pub struct TransformPipeline {
    name: String,
    base: Arc<dyn Pipeline>,
    input: Option<Transform>,
    output: Option<Transform>,
}

impl TransformPipeline {
    /// Wrap `base` with no transforms.
    pub fn new(name: impl Into<String>, base: Arc<dyn Pipeline>) -> Self {
        Self {
            name: name.into(),
            base,
            input: None,
            output: None,
        }
    }

    /// Rewrite the prompt before `base` runs.
    pub fn with_input(mut self, transform: Transform) -> Self {
        self.input = Some(transform);
        self
    }

    /// Rewrite the content after `base` returns.
    pub fn with_output(mut self, transform: Transform) -> Self {
        self.output = Some(transform);
        self
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        ctx.check_cancelled()?;
        let request = match &self.input {
            Some(t) => request.with_prompt(t.apply(&request.prompt, &ctx.vars)),
            None => request,
        };

        let mut response = self.base.execute_with_request(ctx, request).await?;

        if let Some(t) = &self.output {
            response.content = t.apply(&response.content, &ctx.vars);
            response.set_meta("output_transform", t.label());
        }
        if let Some(t) = &self.input {
            response.set_meta("input_transform", t.label());
        }
        Ok(response)
    }
}

impl Pipeline for TransformPipeline {
    fn kind(&self) -> &'static str {
        "transform"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SimplePipeline;
    use crate::provider::MockProvider;

    #[test]
    fn test_parse_builtins_and_templates() {
        assert!(matches!("trim".parse::<Transform>().unwrap(), Transform::Trim));
        assert!(matches!(
            "strip_code_fences".parse::<Transform>().unwrap(),
            Transform::StripCodeFences
        ));
        assert!(matches!(
            "Summarize: {input}".parse::<Transform>().unwrap(),
            Transform::Template(_)
        ));
        let err = "reverse".parse::<Transform>().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  ```\nplain\n```  "), "plain");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }

    #[tokio::test]
    async fn test_input_template_uses_ctx_vars() {
        let echo = Arc::new(MockProvider::echo("echo"));
        let pipeline = TransformPipeline::new(
            "translate",
            Arc::new(SimplePipeline::new("base", echo.clone())),
        )
        .with_input("Translate to {lang}: {input}".parse().unwrap())
        .with_output(Transform::Uppercase);

        let ctx = ExecCtx::builder().var("lang", "German").build();
        let resp = pipeline
            .execute_with_request(&ctx, Request::new("good morning"))
            .await
            .unwrap();
        assert_eq!(echo.prompts(), vec!["Translate to German: good morning"]);
        assert_eq!(resp.content, "TRANSLATE TO GERMAN: GOOD MORNING");
        assert_eq!(resp.meta("input_transform"), Some(&serde_json::json!("template")));
        assert_eq!(resp.meta("output_transform"), Some(&serde_json::json!("uppercase")));
    }

    #[tokio::test]
    async fn test_func_output_transform() {
        let pipeline = TransformPipeline::new(
            "count",
            Arc::new(SimplePipeline::new(
                "base",
                Arc::new(MockProvider::fixed("m", "one two three")),
            )),
        )
        .with_output(Transform::func(|s| s.split_whitespace().count().to_string()));
        assert_eq!(pipeline.execute(&ExecCtx::new(), "x").await.unwrap(), "3");
    }

    #[tokio::test]
    async fn test_base_error_passes_through() {
        let pipeline = TransformPipeline::new(
            "t",
            Arc::new(SimplePipeline::new(
                "base",
                Arc::new(MockProvider::failing("m", "down")),
            )),
        )
        .with_output(Transform::Trim);
        let err = pipeline.execute(&ExecCtx::new(), "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Provider { .. }));
    }
}
