//! Example: fan a question out to three providers and keep the majority answer.
//!
//! Run with: `RUST_LOG=llm_orchestra=debug cargo run --example parallel_vote`

use llm_orchestra::combiner::MajorityVoteCombiner;
use llm_orchestra::{
    Event, ExecCtx, FnEventHandler, MockProvider, ParallelPipeline, Pipeline, PipelineOptions,
    Request,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Respects RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Three stand-ins for real backends; one is slow, one is flaky
    let pipeline = ParallelPipeline::new("capital-vote")
        .push(Arc::new(
            MockProvider::fixed("fast", "Canberra").with_delay(Duration::from_millis(20)),
        ))
        .push(Arc::new(
            MockProvider::fixed("slow", "Canberra").with_delay(Duration::from_millis(200)),
        ))
        .push(Arc::new(MockProvider::fixed("flaky", "Sydney").failing_first(1)))
        .with_combiner(Arc::new(MajorityVoteCombiner::new()))
        .with_options(PipelineOptions::default().with_max_retries(2));

    let ctx = ExecCtx::builder()
        .timeout(Duration::from_secs(5))
        .event_handler(Arc::new(FnEventHandler(|event: Event| {
            if let Event::ProviderRetry { provider, attempt, .. } = event {
                println!("  retrying {provider} (attempt {attempt})");
            }
        })))
        .build();

    let response = pipeline
        .execute_with_request(&ctx, Request::new("What is the capital of Australia?"))
        .await?;

    println!("Answer: {}", response.content);
    for key in ["votes", "total_responses", "consensus_ratio"] {
        if let Some(value) = response.meta(key) {
            println!("  {key}: {value}");
        }
    }

    Ok(())
}
