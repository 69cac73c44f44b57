//! Builds live pipelines from [`PipelineConfig`]s.
//!
//! Everything that can be wrong with a config is caught here, before any
//! provider is called: missing fields, unknown provider or combiner names,
//! malformed options, and `config_ref` cycles.

use super::{ConfigStore, PipelineConfig, PipelineStageConfig, PipelineType};
use crate::combiner::{CombinerParams, CombinerRegistry, ResultCombiner};
use crate::error::{PipelineError, Result};
use crate::options::PipelineOptions;
use crate::pipeline::{
    CollaborativePipeline, HighAvailabilityPipeline, NestedPipeline, ParallelPipeline, Pipeline,
    SerialPipeline, SimplePipeline, Transform, TransformPipeline,
};
use crate::provider::{Provider, ProviderRegistry};
use std::sync::Arc;

/// How deep stage and base-config nesting may go before it is treated as a cycle.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Turns configs into pipelines, resolving names through its registries.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use llm_orchestra::config::{ConfigFactory, PipelineConfig, PipelineType};
/// use llm_orchestra::Pipeline;
/// use llm_orchestra::provider::{MockProvider, ProviderRegistry};
///
/// let providers = Arc::new(ProviderRegistry::new());
/// providers.register(Arc::new(MockProvider::fixed("draft", "v1")));
/// let factory = ConfigFactory::new(providers);
///
/// let cfg = PipelineConfig::new("chain", PipelineType::Serial).with_providers(["draft"]);
/// let pipeline = factory.create_from_pipeline_config(&cfg).unwrap();
/// assert_eq!(pipeline.kind(), "serial");
/// ```
pub struct ConfigFactory {
    providers: Arc<ProviderRegistry>,
    combiners: CombinerRegistry,
    store: Option<ConfigStore>,
}

impl ConfigFactory {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self {
            providers,
            combiners: CombinerRegistry::with_builtins(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: ConfigStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_combiners(mut self, combiners: CombinerRegistry) -> Self {
        self.combiners = combiners;
        self
    }

    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    pub fn store(&self) -> Option<&ConfigStore> {
        self.store.as_ref()
    }

    fn require_store(&self) -> Result<&ConfigStore> {
        self.store.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("config factory has no config store".into())
        })
    }

    pub fn save_config(&self, config: &PipelineConfig) -> Result<()> {
        self.require_store()?.save(config)
    }

    pub fn load_config(&self, name: &str) -> Result<PipelineConfig> {
        self.require_store()?.load(name)
    }

    pub fn delete_config(&self, name: &str) -> Result<()> {
        self.require_store()?.delete(name)
    }

    pub fn list_configs(&self) -> Result<Vec<PipelineConfig>> {
        self.require_store()?.list()
    }

    pub fn export_config(&self, name: &str) -> Result<Vec<u8>> {
        self.require_store()?.export(name)
    }

    pub fn import_config(&self, data: &[u8]) -> Result<PipelineConfig> {
        self.require_store()?.import(data)
    }

    /// Load a stored config by name and build it.
    pub fn create_from_config(&self, name: &str) -> Result<Arc<dyn Pipeline>> {
        let config = self.load_config(name)?;
        self.build(&config, name, 0)
    }

    /// Validate and build `config`.
    pub fn create_from_pipeline_config(&self, config: &PipelineConfig) -> Result<Arc<dyn Pipeline>> {
        self.build(config, &config.name, 0)
    }

    fn build(&self, cfg: &PipelineConfig, fallback_name: &str, depth: usize) -> Result<Arc<dyn Pipeline>> {
        if depth > MAX_NESTING_DEPTH {
            return Err(PipelineError::InvalidConfig(format!(
                "pipeline nesting deeper than {} levels (is there a config_ref cycle?)",
                MAX_NESTING_DEPTH
            )));
        }
        cfg.validate()?;

        let name = if !cfg.name.is_empty() {
            cfg.name.clone()
        } else if !fallback_name.is_empty() {
            fallback_name.to_string()
        } else {
            cfg.kind.to_string().to_lowercase()
        };
        let options = PipelineOptions::from_map(&cfg.options)?;
        tracing::debug!(pipeline = %name, kind = %cfg.kind, depth, "building pipeline");

        let pipeline: Arc<dyn Pipeline> = match cfg.kind {
            PipelineType::Simple => {
                let provider_name = cfg.provider.as_deref().unwrap_or_default();
                Arc::new(
                    SimplePipeline::new(name, self.resolve(cfg, provider_name)?)
                        .with_options(options),
                )
            }
            PipelineType::Serial => {
                let mut serial = SerialPipeline::new(name).with_options(options);
                for provider in self.resolve_all(cfg, &cfg.providers)? {
                    serial.add(provider);
                }
                Arc::new(serial)
            }
            PipelineType::Parallel => {
                let providers = self.resolve_all(cfg, &cfg.providers)?;
                let combiner = self.combiner(cfg, &providers)?;
                let parallel = providers.into_iter().fold(
                    ParallelPipeline::new(name)
                        .with_combiner(combiner)
                        .with_options(options),
                    ParallelPipeline::push,
                );
                Arc::new(parallel)
            }
            PipelineType::Collaborative => {
                let rounds = cfg
                    .rounds
                    .unwrap_or(crate::pipeline::collaborative::DEFAULT_ROUNDS);
                let collaborative = self.resolve_all(cfg, &cfg.providers)?.into_iter().fold(
                    CollaborativePipeline::new(name)
                        .with_rounds(rounds)
                        .with_options(options),
                    CollaborativePipeline::push,
                );
                Arc::new(collaborative)
            }
            PipelineType::Ha => {
                let ha = self.resolve_all(cfg, &cfg.providers)?.into_iter().fold(
                    HighAvailabilityPipeline::new(name).with_options(options),
                    HighAvailabilityPipeline::push,
                );
                Arc::new(ha)
            }
            PipelineType::Nested => {
                let mut nested = NestedPipeline::new(name);
                for (idx, stage) in cfg.stages.iter().enumerate() {
                    let built = self
                        .build_stage(stage, depth)
                        .map_err(|e| e.in_stage(idx + 1, &stage.name))?;
                    nested.add(built);
                }
                Arc::new(nested)
            }
            PipelineType::Transform => {
                let base_cfg = cfg.base_config.as_deref().ok_or_else(|| {
                    PipelineError::InvalidConfig("Transform pipeline requires BaseConfig".into())
                })?;
                let base = self.build(base_cfg, &format!("{}.base", name), depth + 1)?;
                let mut transform = TransformPipeline::new(name, base);
                if let Some(t) = &cfg.input_transform {
                    transform = transform.with_input(t.parse::<Transform>()?);
                }
                if let Some(t) = &cfg.output_transform {
                    transform = transform.with_output(t.parse::<Transform>()?);
                }
                Arc::new(transform)
            }
        };
        Ok(pipeline)
    }

    fn build_stage(&self, stage: &PipelineStageConfig, depth: usize) -> Result<Arc<dyn Pipeline>> {
        match (&stage.config_ref, &stage.pipeline) {
            (Some(reference), None) => {
                let referenced = self.load_config(reference)?;
                self.build(&referenced, &stage.name, depth + 1)
            }
            (None, Some(inline)) => self.build(inline, &stage.name, depth + 1),
            _ => Err(PipelineError::InvalidConfig(
                "stage requires exactly one of ConfigRef or Pipeline".into(),
            )),
        }
    }

    fn resolve(&self, cfg: &PipelineConfig, provider: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .resolve(provider, cfg.provider_configs.get(provider))
    }

    fn resolve_all(&self, cfg: &PipelineConfig, names: &[String]) -> Result<Vec<Arc<dyn Provider>>> {
        names.iter().map(|name| self.resolve(cfg, name)).collect()
    }

    fn combiner(
        &self,
        cfg: &PipelineConfig,
        providers: &[Arc<dyn Provider>],
    ) -> Result<Arc<dyn ResultCombiner>> {
        let evaluator = match &cfg.judge {
            Some(judge) => Some(self.resolve(cfg, judge)?),
            None => providers.first().cloned(),
        };
        let params = CombinerParams {
            config: cfg
                .combiner_config
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            separator: cfg.separator.clone(),
            evaluator,
            jurors: self.resolve_all(cfg, &cfg.jurors)?,
            voting: cfg.voting.clone(),
        };
        let name = cfg
            .combiner
            .as_deref()
            .unwrap_or(CombinerRegistry::DEFAULT_COMBINER);
        self.combiners.create(name, &params)
    }
}

impl std::fmt::Debug for ConfigFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigFactory")
            .field("providers", &self.providers)
            .field("combiners", &self.combiners)
            .field("store", &self.store)
            .finish()
    }
}
