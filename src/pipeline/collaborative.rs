//! Multi-round discussion among providers.
//!
//! The discussion starts as `Topic: <input>`. In each round every provider,
//! in list order, reads the discussion so far and adds a contribution labeled
//! with its name and the round number. After the last round the first
//! provider writes a low-temperature synthesis.
//!
//! A failed turn (after retries) fails the whole pipeline. A failed synthesis
//! does not: the raw discussion is returned instead, with
//! `synthesis_failed: true` in the metadata. This is the only place in the
//! crate where a failure degrades instead of propagating.

use super::{observed, BoxFut, Pipeline};
use crate::{
    error::{PipelineError, Result},
    events::Event,
    exec_ctx::ExecCtx,
    options::PipelineOptions,
    provider::Provider,
    retry::call_with_retry,
    types::{Request, Response},
};
use std::sync::Arc;

/// Default number of discussion rounds.
pub const DEFAULT_ROUNDS: u32 = 3;

/// One provider's turn in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub round: u32,
    pub provider: String,
    pub content: String,
}

/// The growing discussion transcript.
#[derive(Debug, Clone)]
pub struct Discussion {
    text: String,
    contributions: Vec<Contribution>,
}

impl Discussion {
    /// Start a transcript seeded with the topic.
    pub fn new(topic: &str) -> Self {
        Self {
            text: format!("Topic: {}", topic),
            contributions: Vec::new(),
        }
    }

    /// Append a labeled contribution.
    pub fn add(&mut self, round: u32, provider: &str, content: &str) {
        self.text.push_str(&format!(
            "\n\n[Round {}] {}:\n{}",
            round,
            provider,
            content.trim()
        ));
        self.contributions.push(Contribution {
            round,
            provider: provider.to_string(),
            content: content.to_string(),
        });
    }

    /// The full transcript.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Every turn so far, in speaking order.
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }
}

/// Runs a round-based discussion, then asks the first provider to synthesize it.
pub struct CollaborativePipeline {
    name: String,
    providers: Vec<Arc<dyn Provider>>,
    rounds: u32,
    options: PipelineOptions,
}

impl CollaborativePipeline {
    /// Create an empty panel with the default number of rounds.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            providers: Vec::new(),
            rounds: DEFAULT_ROUNDS,
            options: PipelineOptions::default(),
        }
    }

    /// Add a participant. The first participant also writes the synthesis.
    pub fn push(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the number of rounds (at least 1).
    pub fn with_rounds(mut self, rounds: u32) -> Self {
        self.rounds = rounds.max(1);
        self
    }

    /// Set retry and sampling options.
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Number of discussion rounds.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    fn turn_prompt(&self, discussion: &Discussion, round: u32, provider: &str) -> String {
        format!(
            "{}\n\n---\nThis is round {} of {}. You are {}. \
             Add your contribution to the discussion above: build on the strongest points, \
             challenge anything you disagree with, and raise what is missing. \
             Reply with your contribution only.",
            discussion.text(),
            round,
            self.rounds,
            provider
        )
    }

    fn synthesis_prompt(discussion: &Discussion) -> String {
        format!(
            "{}\n\n---\nThe discussion is over. Write the final answer to the topic, \
             combining the best ideas raised and resolving any disagreements.",
            discussion.text()
        )
    }

    /// Run every round and return the transcript, without the synthesis.
    pub async fn discuss(&self, ctx: &ExecCtx, request: &Request) -> Result<Discussion> {
        if self.providers.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "collaborative pipeline needs at least one provider".to_string(),
            ));
        }

        let policy = self.options.retry_policy();
        let mut discussion = Discussion::new(&request.prompt);

        for round in 1..=self.rounds {
            ctx.check_cancelled()?;
            ctx.emit(Event::RoundStart {
                pipeline: self.name.clone(),
                round,
                total_rounds: self.rounds,
            });
            tracing::debug!(pipeline = %self.name, round, "collaborative round");

            for provider in &self.providers {
                let turn = request
                    .with_prompt(self.turn_prompt(&discussion, round, provider.name()))
                    .with_temperature(self.options.temperature)
                    .with_max_tokens(self.options.max_tokens);
                let reply = call_with_retry(ctx, provider.as_ref(), &turn, &policy)
                    .await
                    .map_err(|e| e.in_round(round, provider.name()))?;
                discussion.add(round, provider.name(), &reply.content);
            }
        }

        Ok(discussion)
    }

    async fn run(&self, ctx: &ExecCtx, request: Request) -> Result<Response> {
        let discussion = self.discuss(ctx, &request).await?;
        ctx.check_cancelled()?;

        let provider_names: Vec<String> =
            self.providers.iter().map(|p| p.name().to_string()).collect();
        let summarizer = &self.providers[0];
        let synthesis = request
            .with_prompt(Self::synthesis_prompt(&discussion))
            .with_temperature(self.options.synthesis_temperature)
            .with_max_tokens(self.options.max_tokens);

        let mut response = match call_with_retry(
            ctx,
            summarizer.as_ref(),
            &synthesis,
            &self.options.retry_policy(),
        )
        .await
        {
            Ok(r) => r,
            Err(e) if e.is_cancellation() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    pipeline = %self.name,
                    summarizer = summarizer.name(),
                    error = %e,
                    "synthesis failed; returning the raw discussion"
                );
                Response::new(self.name.clone(), discussion.text())
                    .with_meta("synthesis_failed", true)
                    .with_meta("synthesis_error", e.to_string())
            }
        };

        response.set_meta("full_discussion", discussion.text());
        response.set_meta("rounds", self.rounds);
        response.set_meta("providers", provider_names);
        Ok(response)
    }
}

impl Pipeline for CollaborativePipeline {
    fn kind(&self) -> &'static str {
        "collaborative"
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
    use crate::provider::MockProvider;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;

    #[tokio::test]
    async fn test_two_rounds_two_providers_make_four_contributions() {
        let alice = Arc::new(MockProvider::new(
            "alice",
            vec!["a1".into(), "a2".into(), "final answer".into()],
        ));
        let bob = Arc::new(MockProvider::new("bob", vec!["b1".into(), "b2".into()]));
        let pipeline = CollaborativePipeline::new("panel")
            .push(alice.clone())
            .push(bob.clone())
            .with_rounds(2);

        let resp = pipeline
            .execute_with_request(&ExecCtx::new(), Request::new("tabs or spaces"))
            .await
            .unwrap();
        assert_eq!(resp.content, "final answer");
        assert_eq!(resp.provider, "alice");

        // the synthesis call sees exactly the four labeled turns
        let synthesis_prompt = alice.prompts().last().cloned().unwrap();
        assert!(synthesis_prompt.starts_with("Topic: tabs or spaces"));
        assert_eq!(synthesis_prompt.matches("[Round ").count(), 4);
        for label in ["[Round 1] alice:\na1", "[Round 1] bob:\nb1", "[Round 2] alice:\na2", "[Round 2] bob:\nb2"] {
            assert!(synthesis_prompt.contains(label), "missing {}", label);
        }
        assert_eq!(alice.temperatures().last().copied(), Some(0.3));
        assert_eq!(alice.call_count(), 3);
        assert_eq!(bob.call_count(), 2);

        assert_eq!(resp.meta("rounds"), Some(&json!(2)));
        assert_eq!(resp.meta("providers"), Some(&json!(["alice", "bob"])));
        assert!(resp
            .meta("full_discussion")
            .and_then(|v| v.as_str())
            .is_some_and(|d| d.contains("[Round 2] bob:")));
    }

    #[tokio::test]
    async fn test_discuss_turn_order() {
        let pipeline = CollaborativePipeline::new("panel")
            .push(Arc::new(MockProvider::fixed("a", "x")))
            .push(Arc::new(MockProvider::fixed("b", "y")))
            .with_rounds(2);
        let discussion = pipeline
            .discuss(&ExecCtx::new(), &Request::new("t"))
            .await
            .unwrap();
        let order: Vec<_> = discussion
            .contributions()
            .iter()
            .map(|c| (c.round, c.provider.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "a"), (1, "b"), (2, "a"), (2, "b")]);
    }

    #[tokio::test]
    async fn test_turn_prompt_names_round_and_provider() {
        let bob = Arc::new(MockProvider::fixed("bob", "ok"));
        let pipeline = CollaborativePipeline::new("panel")
            .push(Arc::new(MockProvider::fixed("alice", "ok")))
            .push(bob.clone())
            .with_rounds(1);
        pipeline.execute(&ExecCtx::new(), "topic").await.unwrap();
        let prompt = &bob.prompts()[0];
        assert!(prompt.contains("round 1 of 1"));
        assert!(prompt.contains("You are bob"));
        assert!(prompt.contains("[Round 1] alice:\nok"));
    }

    #[tokio::test]
    async fn test_failed_turn_names_provider_and_round() {
        let pipeline = CollaborativePipeline::new("panel")
            .push(Arc::new(MockProvider::fixed("a", "x")))
            .push(Arc::new(MockProvider::fixed("b", "y").failing_first(usize::MAX)))
            .with_rounds(2);
        let err = pipeline.execute(&ExecCtx::new(), "t").await.unwrap_err();
        match err {
            PipelineError::RoundFailed { round, provider, .. } => {
                assert_eq!(round, 1);
                assert_eq!(provider, "b");
            }
            other => panic!("expected RoundFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_turns_are_retried() {
        let flaky = Arc::new(MockProvider::fixed("flaky", "x").failing_first(1));
        let pipeline = CollaborativePipeline::new("panel")
            .push(flaky.clone())
            .with_rounds(1)
            .with_options(PipelineOptions::default().with_max_retries(2));
        pipeline.execute(&ExecCtx::new(), "t").await.unwrap();
        // one failed turn attempt, one successful turn, one synthesis
        assert_eq!(flaky.call_count(), 3);
    }

    #[tokio::test]
    async fn test_synthesis_failure_returns_raw_discussion() {
        // answers its turn, refuses the synthesis
        struct TurnThenFail(MockProvider);

        #[async_trait::async_trait]
        impl Provider for TurnThenFail {
            async fn generate_response(&self, ctx: &ExecCtx, request: &Request) -> Result<Response> {
                if request.prompt.contains("The discussion is over") {
                    return Err(PipelineError::provider("lead", "summary refused"));
                }
                self.0.generate_response(ctx, request).await
            }
            fn name(&self) -> &str {
                self.0.name()
            }
            fn model(&self) -> &str {
                self.0.model()
            }
        }

        let pipeline = CollaborativePipeline::new("panel")
            .push(Arc::new(TurnThenFail(MockProvider::fixed("lead", "my point"))))
            .with_rounds(1);
        let resp = pipeline
            .execute_with_request(&ExecCtx::new(), Request::new("t"))
            .await
            .unwrap();
        assert_eq!(resp.content, "Topic: t\n\n[Round 1] lead:\nmy point");
        assert_eq!(resp.meta("synthesis_failed"), Some(&json!(true)));
        assert_eq!(resp.meta("rounds"), Some(&json!(1)));
        assert_eq!(resp.meta("providers"), Some(&json!(["lead"])));
    }

    #[tokio::test]
    async fn test_cancel_during_turn_finishes_turn_then_stops() {
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = ExecCtx::builder().cancellation(cancel.clone()).build();
        let lead = Arc::new(MockProvider::fixed("lead", "point").cancelling(cancel.clone()));
        let pipeline = CollaborativePipeline::new("panel")
            .push(lead.clone())
            .with_rounds(2);

        let err = pipeline.execute(&ctx, "t").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled), "got {err:?}");
        // round 1 turn only: no round 2 turn, no synthesis
        assert_eq!(lead.call_count(), 1);
        assert_eq!(lead.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_checked_at_round_boundary() {
        let cancel = Arc::new(AtomicBool::new(true));
        let ctx = ExecCtx::builder().cancellation(cancel).build();
        let mock = Arc::new(MockProvider::fixed("a", "x"));
        let pipeline = CollaborativePipeline::new("panel").push(mock.clone());
        let err = pipeline.execute(&ctx, "t").await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }
}
