//! Name-keyed combiner construction.
//!
//! Combiner names come from persisted configs, so they are resolved through a
//! [`CombinerRegistry`] when the pipeline is built. An unknown name is a
//! build-time [`PipelineError::UnknownCombiner`], never a silent default.

use super::{
    ConcatCombiner, ConsensusCombiner, FirstSuccessfulCombiner, JuryCombiner,
    LongestResponseCombiner, MajorityVoteCombiner, QualityScoreCombiner, RandomCombiner,
    ResultCombiner, RoundRobinCombiner, VotingRule, WeightedCombiner,
};
use crate::error::{PipelineError, Result};
use crate::provider::Provider;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a combiner constructor may need, resolved by the factory.
#[derive(Clone, Default)]
pub struct CombinerParams {
    /// Strategy-specific settings (`weights`, `min_length`, `temperature`).
    pub config: HashMap<String, Value>,
    /// Separator for `concat`.
    pub separator: Option<String>,
    /// Evaluator provider for `consensus`.
    pub evaluator: Option<Arc<dyn Provider>>,
    /// Juror providers for `jury`.
    pub jurors: Vec<Arc<dyn Provider>>,
    /// Voting rule name for `jury`.
    pub voting: Option<String>,
}

/// Builds a combiner from resolved parameters.
pub type CombinerConstructor =
    Arc<dyn Fn(&CombinerParams) -> Result<Arc<dyn ResultCombiner>> + Send + Sync>;

/// Registry mapping strategy names (and aliases) to constructors.
#[derive(Clone)]
pub struct CombinerRegistry {
    constructors: HashMap<String, CombinerConstructor>,
}

impl Default for CombinerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CombinerRegistry {
    /// The name used when a config does not set one.
    pub const DEFAULT_COMBINER: &'static str = "concat";

    /// A registry with no strategies.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every built-in strategy and its aliases.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("concat", |p| {
            let sep = p
                .separator
                .clone()
                .unwrap_or_else(|| super::concat::DEFAULT_SEPARATOR.to_string());
            Ok(Arc::new(ConcatCombiner::new(sep)) as Arc<dyn ResultCombiner>)
        });
        registry.register_aliased(&["majority", "majority_vote", "vote"], |_| {
            Ok(Arc::new(MajorityVoteCombiner::new()) as Arc<dyn ResultCombiner>)
        });
        registry.register_aliased(&["first", "first_successful"], |_| {
            Ok(Arc::new(FirstSuccessfulCombiner) as Arc<dyn ResultCombiner>)
        });
        registry.register_aliased(&["longest", "longest_response"], |_| {
            Ok(Arc::new(LongestResponseCombiner) as Arc<dyn ResultCombiner>)
        });
        registry.register("round_robin", |_| {
            Ok(Arc::new(RoundRobinCombiner::new()) as Arc<dyn ResultCombiner>)
        });
        registry.register("random", |_| {
            Ok(Arc::new(RandomCombiner) as Arc<dyn ResultCombiner>)
        });
        registry.register("consensus", |p| {
            let evaluator = p.evaluator.clone().ok_or_else(|| {
                PipelineError::InvalidConfig(
                    "consensus combiner requires Judge or at least one provider".into(),
                )
            })?;
            let mut combiner = ConsensusCombiner::new(evaluator);
            if let Some(t) = p.config.get("temperature") {
                let t = t.as_f64().ok_or_else(|| {
                    PipelineError::InvalidConfig("combiner temperature must be a number".into())
                })?;
                combiner = combiner.with_temperature(t);
            }
            Ok(Arc::new(combiner) as Arc<dyn ResultCombiner>)
        });
        registry.register("weighted", |p| {
            Ok(Arc::new(WeightedCombiner::new(weights_from(&p.config)?)) as Arc<dyn ResultCombiner>)
        });
        registry.register_aliased(&["quality", "quality_score"], |p| {
            let min_length = match p.config.get("min_length") {
                Some(v) => v.as_u64().ok_or_else(|| {
                    PipelineError::InvalidConfig("min_length must be a non-negative integer".into())
                })? as usize,
                None => QualityScoreCombiner::DEFAULT_MIN_LENGTH,
            };
            Ok(Arc::new(QualityScoreCombiner::new(min_length)) as Arc<dyn ResultCombiner>)
        });
        registry.register("jury", |p| {
            if p.jurors.is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "jury combiner requires Jurors".into(),
                ));
            }
            let rule: VotingRule = p.voting.as_deref().unwrap_or("").parse()?;
            Ok(Arc::new(JuryCombiner::new(p.jurors.clone(), rule)) as Arc<dyn ResultCombiner>)
        });
        registry
    }

    /// Register (or replace) a strategy under `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&CombinerParams) -> Result<Arc<dyn ResultCombiner>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(normalize(name), Arc::new(constructor));
    }

    fn register_aliased<F>(&mut self, names: &[&str], constructor: F)
    where
        F: Fn(&CombinerParams) -> Result<Arc<dyn ResultCombiner>> + Send + Sync + 'static,
    {
        let shared: CombinerConstructor = Arc::new(constructor);
        for name in names {
            self.constructors.insert(normalize(name), shared.clone());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&normalize(name))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the strategy registered under `name`.
    pub fn create(&self, name: &str, params: &CombinerParams) -> Result<Arc<dyn ResultCombiner>> {
        let constructor = self
            .constructors
            .get(&normalize(name))
            .ok_or_else(|| PipelineError::UnknownCombiner(name.to_string()))?;
        constructor(params)
    }
}

impl std::fmt::Debug for CombinerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinerRegistry")
            .field("names", &self.names())
            .finish()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}

fn weights_from(config: &HashMap<String, Value>) -> Result<HashMap<String, f64>> {
    let Some(raw) = config.get("weights") else {
        return Ok(HashMap::new());
    };
    let obj = raw.as_object().ok_or_else(|| {
        PipelineError::InvalidConfig("weights must be an object of provider -> number".into())
    })?;
    obj.iter()
        .map(|(provider, w)| {
            w.as_f64().map(|w| (provider.clone(), w)).ok_or_else(|| {
                PipelineError::InvalidConfig(format!("weight for '{}' must be a number", provider))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::testutil::responses;
    use crate::exec_ctx::ExecCtx;
    use serde_json::json;

    #[test]
    fn test_unknown_combiner_fails() {
        let err = CombinerRegistry::with_builtins()
            .create("telepathy", &CombinerParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::UnknownCombiner(ref n) if n == "telepathy"));
    }

    #[test]
    fn test_aliases_resolve() {
        let registry = CombinerRegistry::with_builtins();
        for alias in ["majority", "Majority-Vote", "vote", "first_successful", "quality_score"] {
            assert!(registry.contains(alias), "{} missing", alias);
        }
        let c = registry.create("longest-response", &CombinerParams::default()).unwrap();
        assert_eq!(c.name(), "longest");
    }

    #[test]
    fn test_consensus_needs_evaluator() {
        let err = CombinerRegistry::with_builtins()
            .create("consensus", &CombinerParams::default())
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_jury_needs_jurors() {
        let err = CombinerRegistry::with_builtins()
            .create("jury", &CombinerParams::default())
            .err()
            .unwrap();
        assert!(err.to_string().contains("Jurors"));
    }

    #[tokio::test]
    async fn test_weighted_reads_config() {
        let params = CombinerParams {
            config: serde_json::from_value(json!({"weights": {"p2": 5.0}})).unwrap(),
            ..Default::default()
        };
        let combiner = CombinerRegistry::with_builtins().create("weighted", &params).unwrap();
        let out = combiner
            .combine(&ExecCtx::new(), &responses(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(out.provider, "p2");
    }

    #[test]
    fn test_bad_weights_rejected() {
        let params = CombinerParams {
            config: serde_json::from_value(json!({"weights": {"p2": "heavy"}})).unwrap(),
            ..Default::default()
        };
        assert!(CombinerRegistry::with_builtins().create("weighted", &params).is_err());
    }

    #[tokio::test]
    async fn test_concat_uses_separator() {
        let params = CombinerParams {
            separator: Some(" / ".into()),
            ..Default::default()
        };
        let combiner = CombinerRegistry::with_builtins().create("concat", &params).unwrap();
        let out = combiner
            .combine(&ExecCtx::new(), &responses(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(out.content, "a / b");
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = CombinerRegistry::empty();
        registry.register("mine", |_| Ok(Arc::new(MajorityVoteCombiner::new()) as Arc<dyn ResultCombiner>));
        assert_eq!(registry.names(), vec!["mine"]);
    }
}
