//! Request and response types shared by providers, pipelines, and combiners.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Default sampling temperature for a fresh [`Request`].
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Default completion budget for a fresh [`Request`].
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// A provider-agnostic generation request.
///
/// Requests are treated as immutable once dispatched. Pipelines derive new
/// requests for sub-calls with the `with_*` methods, which take `&self` and
/// return a modified copy.
#[derive(Clone)]
pub struct Request {
    /// The prompt text.
    pub prompt: String,
    /// Sampling temperature (0.0 = deterministic).
    pub temperature: f64,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Whether the caller wants streamed output.
    pub stream: bool,
    /// Functions the model may call.
    pub functions: Option<Arc<FunctionRegistry>>,
    /// Executor for function calls the model emits.
    pub function_executor: Option<Arc<dyn FunctionExecutor>>,
}

impl Request {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: false,
            functions: None,
            function_executor: None,
        }
    }

    /// Derive a request with a different prompt, keeping every other setting.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }

    /// Derive a request with a different temperature.
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }

    /// Derive a request with a different token budget.
    pub fn with_max_tokens(&self, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..self.clone()
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_functions(
        mut self,
        functions: Arc<FunctionRegistry>,
        executor: Option<Arc<dyn FunctionExecutor>>,
    ) -> Self {
        self.functions = Some(functions);
        self.function_executor = executor;
        self
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("prompt_len", &self.prompt.len())
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stream", &self.stream)
            .field(
                "functions",
                &self.functions.as_ref().map(|f| f.len()).unwrap_or(0),
            )
            .field("has_function_executor", &self.function_executor.is_some())
            .finish()
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A function invocation emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// A generation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Generated text.
    pub content: String,
    /// Name of the provider (or pipeline) that produced this response.
    pub provider: String,
    /// Model identifier, if known.
    pub model: String,
    pub usage: Option<Usage>,
    pub function_call: Option<FunctionCall>,
    /// Open extension point; combiners record provenance here.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Response {
    pub fn new(provider: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Insert a metadata entry (builder style).
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Insert a metadata entry (mutation style).
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Text-only pairing of a provider and its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub provider_name: String,
    pub content: String,
}

impl ProviderResponse {
    pub fn new(provider_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            content: content.into(),
        }
    }
}

impl From<&Response> for ProviderResponse {
    fn from(response: &Response) -> Self {
        Self::new(response.provider.clone(), response.content.clone())
    }
}

/// Join every non-empty content with `separator`, each prefixed by its provider.
pub fn concat_provider_responses(responses: &[ProviderResponse], separator: &str) -> String {
    responses
        .iter()
        .filter(|r| !r.content.trim().is_empty())
        .map(|r| format!("[{}]\n{}", r.provider_name, r.content))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Pick the longest non-empty response. Ties go to the earliest.
pub fn pick_best(responses: &[ProviderResponse]) -> Option<&ProviderResponse> {
    let mut best: Option<&ProviderResponse> = None;
    for r in responses.iter().filter(|r| !r.content.trim().is_empty()) {
        if best.map_or(true, |b| r.content.len() > b.content.len()) {
            best = Some(r);
        }
    }
    best
}

/// Description of a function the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments.
    pub parameters: Value,
}

/// Ordered set of callable functions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<FunctionDefinition>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any existing one with the same name.
    pub fn register(mut self, definition: FunctionDefinition) -> Self {
        self.functions.retain(|f| f.name != definition.name);
        self.functions.push(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn definitions(&self) -> &[FunctionDefinition] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Executes function calls emitted by a model.
#[async_trait]
pub trait FunctionExecutor: Send + Sync {
    async fn execute(&self, call: &FunctionCall) -> Result<String>;
}
