//! Example: persist a pipeline topology, then rebuild and run it by name.
//!
//! Run with: `cargo run --example saved_config`

use llm_orchestra::provider::ProviderRegistry;
use llm_orchestra::{
    ConfigFactory, ConfigStore, ExecCtx, MockProvider, Pipeline, PipelineConfig,
    PipelineStageConfig, PipelineType, Provider, ProviderConfig,
};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let providers = Arc::new(ProviderRegistry::new());
    providers.register(Arc::new(MockProvider::new(
        "outliner",
        vec!["1. Borrowing\n2. Lifetimes\n3. Traits".to_string()],
    )));
    // Factories see the per-pipeline ProviderConfig
    providers.register_factory("writer", |cfg: &ProviderConfig| {
        let model = cfg.model.clone().unwrap_or_else(|| "writer-small".to_string());
        Ok(Arc::new(MockProvider::echo("writer").with_model(model)) as Arc<dyn Provider>)
    });

    let path = std::env::temp_dir().join("llm-orchestra-demo/pipelines.json");
    let factory = ConfigFactory::new(providers).with_store(ConfigStore::new(&path));

    factory.save_config(&PipelineConfig::simple("outline", "outliner"))?;
    factory.save_config(
        &PipelineConfig::new("article", PipelineType::Nested)
            .with_stage(PipelineStageConfig::reference("plan", "outline"))
            .with_stage(PipelineStageConfig::inline(
                "write",
                PipelineConfig::simple("", "writer").with_provider_config(
                    "writer",
                    ProviderConfig {
                        model: Some("writer-large".to_string()),
                        temperature: Some(0.9),
                        ..Default::default()
                    },
                ),
            )),
    )?;

    println!("Stored in {}:", path.display());
    for cfg in factory.list_configs()? {
        println!("  {} ({})", cfg.name, cfg.kind);
    }

    let pipeline = factory.create_from_config("article")?;
    let text = pipeline
        .execute(&ExecCtx::new(), "An intro to Rust ownership")
        .await?;
    println!("\nOutput:\n{text}");

    println!(
        "\nExported:\n{}",
        String::from_utf8(factory.export_config("article")?)?
    );
    Ok(())
}
