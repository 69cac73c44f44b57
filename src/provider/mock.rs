//! Mock provider for testing without a live LLM.
//!
//! [`MockProvider`] returns pre-configured responses in order, can be told to
//! fail, can simulate latency, and records every prompt it receives so tests
//! can assert on call order.
//!
//! # Example
//!
//! ```
//! use llm_orchestra::provider::MockProvider;
//!
//! let mock = MockProvider::new("alpha", vec!["Hello, world!".to_string()]);
//! assert_eq!(mock.call_count(), 0);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{Capabilities, Capability, Provider};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::{Request, Response, Usage};

/// A test provider that returns canned responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    model: String,
    responses: Vec<String>,
    index: AtomicUsize,
    /// Fail every call with this message.
    failure: Option<String>,
    /// Fail this many calls before succeeding.
    fail_first: AtomicUsize,
    delay: Option<Duration>,
    capabilities: Capabilities,
    anonymous: bool,
    /// Raised while answering, like a caller cancelling mid-call.
    cancel_on_call: Option<Arc<AtomicBool>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    temperatures: Mutex<Vec<f64>>,
}

impl MockProvider {
    /// Create a mock provider with the given canned responses.
    ///
    /// Responses are returned in order. When exhausted, cycles from the beginning.
    /// An empty list behaves like a single empty response.
    pub fn new(name: impl Into<String>, responses: Vec<String>) -> Self {
        let responses = if responses.is_empty() {
            vec![String::new()]
        } else {
            responses
        };
        Self {
            name: name.into(),
            model: "mock-model".to_string(),
            responses,
            index: AtomicUsize::new(0),
            failure: None,
            fail_first: AtomicUsize::new(0),
            delay: None,
            capabilities: Capabilities::new(),
            anonymous: false,
            cancel_on_call: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            temperatures: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(name: impl Into<String>, response: impl Into<String>) -> Self {
        Self::new(name, vec![response.into()])
    }

    /// Create a mock whose every call fails with `message`.
    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut mock = Self::new(name, Vec::new());
        mock.failure = Some(message.into());
        mock
    }

    /// Create a mock that replies with the prompt it was given.
    pub fn echo(name: impl Into<String>) -> Self {
        let mut mock = Self::new(name, Vec::new());
        mock.responses = vec![ECHO.to_string()];
        mock
    }

    /// Fail the first `n` calls, then answer normally.
    pub fn failing_first(self, n: usize) -> Self {
        self.fail_first.store(n, Ordering::Relaxed);
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Leave `Response::provider` empty so callers have to fill it in.
    pub fn anonymous_responses(mut self) -> Self {
        self.anonymous = true;
        self
    }

    /// Set `flag` during every call, then answer normally.
    pub fn cancelling(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_on_call = Some(flag);
        self
    }

    /// Number of calls received so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Every request temperature received, in call order.
    pub fn temperatures(&self) -> Vec<f64> {
        self.temperatures.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn next_response(&self, prompt: &str) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        let canned = &self.responses[idx];
        if canned == ECHO {
            prompt.to_string()
        } else {
            canned.clone()
        }
    }

    fn should_fail(&self) -> bool {
        self.fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Marker response that makes the mock echo its prompt.
const ECHO: &str = "\u{0}echo\u{0}";

#[async_trait]
impl Provider for MockProvider {
    async fn generate_response(&self, _ctx: &ExecCtx, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.clone());
        }
        if let Ok(mut temps) = self.temperatures.lock() {
            temps.push(request.temperature);
        }

        if let Some(ref flag) = self.cancel_on_call {
            flag.store(true, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref message) = self.failure {
            return Err(PipelineError::provider(&self.name, message));
        }
        if self.should_fail() {
            return Err(PipelineError::provider(&self.name, "transient failure"));
        }

        let text = self.next_response(&request.prompt);
        let tokens = text.split_whitespace().count() as u32;
        let provider = if self.anonymous {
            String::new()
        } else {
            self.name.clone()
        };
        Ok(Response::new(provider, text)
            .with_model(self.model.clone())
            .with_usage(Usage {
                prompt_tokens: request.prompt.split_whitespace().count() as u32,
                completion_tokens: tokens,
                total_tokens: request.prompt.split_whitespace().count() as u32 + tokens,
            }))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_fixed_response() {
        let mock = MockProvider::fixed("m", "Hello!");
        let resp = mock
            .generate_response(&ExecCtx::new(), &Request::new("hi"))
            .await
            .unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.provider, "m");
        assert_eq!(resp.model, "mock-model");
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockProvider::new("m", vec!["first".into(), "second".into()]);
        let ctx = ExecCtx::new();
        let req = Request::new("q");
        let r1 = mock.generate_response(&ctx, &req).await.unwrap();
        let r2 = mock.generate_response(&ctx, &req).await.unwrap();
        let r3 = mock.generate_response(&ctx, &req).await.unwrap();
        assert_eq!(r1.content, "first");
        assert_eq!(r2.content, "second");
        assert_eq!(r3.content, "first"); // cycles
    }

    #[tokio::test]
    async fn test_mock_records_prompts() {
        let mock = MockProvider::echo("e");
        let ctx = ExecCtx::new();
        let resp = mock.generate_response(&ctx, &Request::new("ping")).await.unwrap();
        assert_eq!(resp.content, "ping");
        mock.generate_response(&ctx, &Request::new("pong")).await.unwrap();
        assert_eq!(mock.prompts(), vec!["ping", "pong"]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_failing_first() {
        let mock = MockProvider::fixed("m", "ok").failing_first(1);
        let ctx = ExecCtx::new();
        let req = Request::new("q");
        assert!(mock.generate_response(&ctx, &req).await.is_err());
        assert!(mock.generate_response(&ctx, &req).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_always_failing() {
        let mock = MockProvider::failing("m", "offline");
        let err = mock
            .generate_response(&ExecCtx::new(), &Request::new("q"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
