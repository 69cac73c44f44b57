//! Declarative pipeline descriptions.
//!
//! A [`PipelineConfig`] describes a pipeline topology by provider *names*; it
//! is what gets persisted by [`ConfigStore`] and turned into a live pipeline
//! by [`ConfigFactory`]. Field names are snake_case in JSON, and empty
//! optional fields are left out when serializing.
//!
//! ```json
//! {
//!   "name": "review",
//!   "type": "parallel",
//!   "providers": ["fast", "careful"],
//!   "combiner": "consensus",
//!   "judge": "careful",
//!   "options": { "max_retries": 3 }
//! }
//! ```

pub mod factory;
pub mod store;

pub use factory::ConfigFactory;
pub use store::ConfigStore;

use crate::combiner::VotingRule;
use crate::error::{PipelineError, Result};
use crate::pipeline::Transform;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Name-keyed collection of configs; one persisted document.
pub type PipelineConfigs = BTreeMap<String, PipelineConfig>;

/// Which pipeline variant a config builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineType {
    Simple,
    Serial,
    Parallel,
    Collaborative,
    Nested,
    Transform,
    #[serde(alias = "high_availability")]
    Ha,
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineType::Simple => "Simple",
            PipelineType::Serial => "Serial",
            PipelineType::Parallel => "Parallel",
            PipelineType::Collaborative => "Collaborative",
            PipelineType::Nested => "Nested",
            PipelineType::Transform => "Transform",
            PipelineType::Ha => "HA",
        })
    }
}

/// Per-provider overrides applied when a provider is resolved for a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Provider-specific settings, passed to factories untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
}

impl ProviderConfig {
    /// Whether any field changes outgoing requests or the reported model.
    pub fn has_request_overrides(&self) -> bool {
        self.model.is_some() || self.temperature.is_some() || self.max_tokens.is_some()
    }
}

/// One stage of a nested pipeline: an inline config or a stored config's name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStageConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Box<PipelineConfig>>,
}

impl PipelineStageConfig {
    pub fn inline(name: impl Into<String>, pipeline: PipelineConfig) -> Self {
        Self {
            name: name.into(),
            config_ref: None,
            pipeline: Some(Box::new(pipeline)),
        }
    }

    pub fn reference(name: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_ref: Some(config.into()),
            pipeline: None,
        }
    }
}

/// Declarative description of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PipelineType,
    /// The provider of a `simple` pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<String>,
    /// Juror providers for the `jury` combiner.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jurors: Vec<String>,
    /// `plurality` or `majority`, for the `jury` combiner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voting: Option<String>,
    /// Discussion rounds for `collaborative`; default 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
    /// Evaluator for the `consensus` combiner; defaults to the first provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combiner: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub combiner_config: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<PipelineStageConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub provider_configs: BTreeMap<String, ProviderConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, Value>,
    /// The wrapped pipeline of a `transform`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_config: Option<Box<PipelineConfig>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transform: Option<String>,
}

impl PipelineConfig {
    /// An empty config of the given type.
    pub fn new(name: impl Into<String>, kind: PipelineType) -> Self {
        Self {
            name: name.into(),
            kind,
            provider: None,
            providers: Vec::new(),
            jurors: Vec::new(),
            voting: None,
            rounds: None,
            separator: None,
            judge: None,
            combiner: None,
            combiner_config: BTreeMap::new(),
            stages: Vec::new(),
            provider_configs: BTreeMap::new(),
            options: BTreeMap::new(),
            base_config: None,
            input_transform: None,
            output_transform: None,
        }
    }

    pub fn simple(name: impl Into<String>, provider: impl Into<String>) -> Self {
        let mut cfg = Self::new(name, PipelineType::Simple);
        cfg.provider = Some(provider.into());
        cfg
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_combiner(mut self, combiner: impl Into<String>) -> Self {
        self.combiner = Some(combiner.into());
        self
    }

    pub fn with_stage(mut self, stage: PipelineStageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_provider_config(mut self, provider: impl Into<String>, cfg: ProviderConfig) -> Self {
        self.provider_configs.insert(provider.into(), cfg);
        self
    }

    /// Check the fields required by `kind`, recursing into inline children.
    ///
    /// Errors name the missing field, e.g. "Simple pipeline requires Provider".
    pub fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            Err(PipelineError::InvalidConfig(format!(
                "{} pipeline requires {}",
                self.kind, field
            )))
        };

        match self.kind {
            PipelineType::Simple => {
                if self.provider.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    return missing("Provider");
                }
            }
            PipelineType::Serial
            | PipelineType::Parallel
            | PipelineType::Collaborative
            | PipelineType::Ha => {
                if self.providers.is_empty() {
                    return missing("Providers");
                }
            }
            PipelineType::Nested => {
                if self.stages.is_empty() {
                    return missing("Stages");
                }
            }
            PipelineType::Transform => {
                if self.base_config.is_none() {
                    return missing("BaseConfig");
                }
            }
        }

        if let Some(blank) = self.providers.iter().position(|p| p.trim().is_empty()) {
            return Err(PipelineError::InvalidConfig(format!(
                "{} pipeline has an empty provider name at position {}",
                self.kind,
                blank + 1
            )));
        }
        if self.kind == PipelineType::Collaborative && self.rounds == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Collaborative pipeline requires Rounds >= 1".into(),
            ));
        }
        if let Some(voting) = &self.voting {
            voting.parse::<VotingRule>()?;
        }
        for transform in [&self.input_transform, &self.output_transform].into_iter().flatten() {
            transform.parse::<Transform>()?;
        }

        for (idx, stage) in self.stages.iter().enumerate() {
            match (&stage.config_ref, &stage.pipeline) {
                (Some(_), None) => {}
                (None, Some(inline)) => inline.validate().map_err(|e| e.in_stage(idx + 1, &stage.name))?,
                _ => {
                    return Err(PipelineError::InvalidConfig(format!(
                        "stage {} ({}) requires exactly one of ConfigRef or Pipeline",
                        idx + 1,
                        stage.name
                    )))
                }
            }
        }
        if let Some(base) = &self.base_config {
            base.validate()?;
        }
        Ok(())
    }
}
