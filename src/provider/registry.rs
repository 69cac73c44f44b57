//! Name-keyed provider lookup.
//!
//! Pipelines never construct providers. The [`ProviderRegistry`] resolves a
//! name either to a registered instance or by invoking a registered factory
//! with that provider's per-pipeline overrides. Resolution happens when a
//! pipeline is built, so an unknown name is a build-time error.

use super::{Capabilities, Provider};
use crate::config::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::{Request, Response};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Builds a provider from its per-pipeline configuration.
pub type ProviderFactory = Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn Provider>> + Send + Sync>;

/// Registry of provider instances and factories.
#[derive(Default)]
pub struct ProviderRegistry {
    instances: RwLock<HashMap<String, Arc<dyn Provider>>>,
    factories: RwLock<HashMap<String, ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made provider under its own name.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, provider);
    }

    /// Register a factory invoked whenever `name` is resolved.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn Provider>> + Send + Sync + 'static,
    {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
            || self
                .factories
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(name)
    }

    /// All resolvable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.extend(
            self.factories
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned(),
        );
        names.sort();
        names.dedup();
        names
    }

    /// Resolve `name`, applying `overrides` if given.
    ///
    /// Registered instances take precedence over factories. Overrides on an
    /// instance are applied through an [`OverriddenProvider`] wrapper.
    pub fn resolve(
        &self,
        name: &str,
        overrides: Option<&ProviderConfig>,
    ) -> Result<Arc<dyn Provider>> {
        let instance = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(provider) = instance {
            return Ok(match overrides {
                Some(cfg) if cfg.has_request_overrides() => {
                    Arc::new(OverriddenProvider::new(provider, cfg.clone()))
                }
                _ => provider,
            });
        }

        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        match factory {
            Some(factory) => {
                let default_cfg = ProviderConfig::default();
                factory(overrides.unwrap_or(&default_cfg))
            }
            None => Err(PipelineError::UnknownProvider(name.to_string())),
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("names", &self.names())
            .finish()
    }
}

/// A provider with request-level overrides (temperature, token budget).
pub struct OverriddenProvider {
    inner: Arc<dyn Provider>,
    config: ProviderConfig,
}

impl OverriddenProvider {
    pub fn new(inner: Arc<dyn Provider>, config: ProviderConfig) -> Self {
        Self { inner, config }
    }

    fn apply(&self, request: &Request) -> Request {
        let mut derived = request.clone();
        if let Some(t) = self.config.temperature {
            derived.temperature = t;
        }
        if let Some(m) = self.config.max_tokens {
            derived.max_tokens = m;
        }
        derived
    }
}

#[async_trait]
impl Provider for OverriddenProvider {
    async fn generate_response(&self, ctx: &ExecCtx, request: &Request) -> Result<Response> {
        let mut response = self.inner.generate_response(ctx, &self.apply(request)).await?;
        if let Some(ref model) = self.config.model {
            response.model = model.clone();
        }
        Ok(response)
    }

    async fn generate_streaming_response(
        &self,
        ctx: &ExecCtx,
        request: &Request,
        on_chunk: &mut (dyn FnMut(String) + Send),
    ) -> Result<()> {
        self.inner
            .generate_streaming_response(ctx, &self.apply(request), on_chunk)
            .await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.config.model.as_deref().unwrap_or_else(|| self.inner.model())
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockProvider;

    #[test]
    fn test_unknown_provider() {
        let registry = ProviderRegistry::new();
        let err = registry.resolve("ghost", None).err().unwrap();
        assert!(matches!(err, PipelineError::UnknownProvider(ref n) if n == "ghost"));
    }

    #[test]
    fn test_register_and_names() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::fixed("b", "x")));
        registry.register(Arc::new(MockProvider::fixed("a", "y")));
        registry.register_factory("c", |_cfg| Ok(Arc::new(MockProvider::fixed("c", "z")) as Arc<dyn Provider>));
        assert_eq!(registry.names(), vec!["a", "b", "c"]);
        assert!(registry.contains("c"));
        assert!(!registry.contains("d"));
    }

    #[test]
    fn test_factory_receives_overrides() {
        let registry = ProviderRegistry::new();
        registry.register_factory("custom", |cfg| {
            let model = cfg.model.clone().unwrap_or_else(|| "default".into());
            Ok(Arc::new(MockProvider::fixed("custom", "x").with_model(model)) as Arc<dyn Provider>)
        });

        let plain = registry.resolve("custom", None).unwrap();
        assert_eq!(plain.model(), "default");

        let cfg = ProviderConfig {
            model: Some("big-model".into()),
            ..Default::default()
        };
        let tuned = registry.resolve("custom", Some(&cfg)).unwrap();
        assert_eq!(tuned.model(), "big-model");
    }

    #[tokio::test]
    async fn test_instance_overrides_apply_to_requests() {
        let mock = Arc::new(MockProvider::fixed("m", "x"));
        let registry = ProviderRegistry::new();
        registry.register(mock.clone());

        let cfg = ProviderConfig {
            temperature: Some(0.05),
            ..Default::default()
        };
        let provider = registry.resolve("m", Some(&cfg)).unwrap();
        provider
            .generate_response(&ExecCtx::new(), &Request::new("q"))
            .await
            .unwrap();
        assert_eq!(mock.temperatures(), vec![0.05]);
    }

    #[tokio::test]
    async fn test_model_override_reaches_response() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::fixed("m", "x").with_model("small")));

        let cfg = ProviderConfig {
            model: Some("large".into()),
            ..Default::default()
        };
        let provider = registry.resolve("m", Some(&cfg)).unwrap();
        assert_eq!(provider.model(), "large");
        let resp = provider
            .generate_response(&ExecCtx::new(), &Request::new("q"))
            .await
            .unwrap();
        assert_eq!(resp.model, "large");
    }

    #[test]
    fn test_registration_survives_poisoned_lock() {
        let registry = Arc::new(ProviderRegistry::new());
        let holder = registry.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.instances.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(registry.instances.is_poisoned());

        registry.register(Arc::new(MockProvider::fixed("late", "x")));
        assert!(registry.contains("late"));
        assert!(registry.resolve("late", None).is_ok());
    }
}
