//! JSON-file persistence for pipeline configs.
//!
//! The whole store is one pretty-printed JSON object keyed by config name.
//! Every mutation loads the full document, changes it, and writes it back.
//! Two processes writing at once can overwrite each other's changes; the
//! store is meant for single-process, interactive use.

use super::{PipelineConfig, PipelineConfigs};
use crate::error::{PipelineError, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A named-config store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing file is an empty store.
    ///
    /// The document key is the config's name. A hand-edited entry whose
    /// `name` is missing or differs from its key takes the key.
    pub fn load_all(&self) -> Result<PipelineConfigs> {
        let mut configs: PipelineConfigs = match fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => PipelineConfigs::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == ErrorKind::NotFound => PipelineConfigs::new(),
            Err(e) => return Err(e.into()),
        };
        for (key, config) in configs.iter_mut() {
            if config.name != *key {
                if !config.name.is_empty() {
                    tracing::warn!(key = %key, name = %config.name, "stored config name differs from its key; using the key");
                }
                config.name = key.clone();
            }
        }
        Ok(configs)
    }

    fn write_all(&self, configs: &PipelineConfigs) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut bytes = serde_json::to_vec_pretty(configs)?;
        bytes.push(b'\n');
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Insert or replace `config` under its name.
    pub fn save(&self, config: &PipelineConfig) -> Result<()> {
        if config.name.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "cannot save a pipeline config without a name".into(),
            ));
        }
        let mut configs = self.load_all()?;
        let replaced = configs
            .insert(config.name.clone(), config.clone())
            .is_some();
        self.write_all(&configs)?;
        tracing::info!(config = %config.name, replaced, path = %self.path.display(), "saved pipeline config");
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<PipelineConfig> {
        self.load_all()?
            .remove(name)
            .ok_or_else(|| PipelineError::ConfigNotFound(name.to_string()))
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let mut configs = self.load_all()?;
        if configs.remove(name).is_none() {
            return Err(PipelineError::ConfigNotFound(name.to_string()));
        }
        self.write_all(&configs)?;
        tracing::info!(config = name, path = %self.path.display(), "deleted pipeline config");
        Ok(())
    }

    /// Every stored config, sorted by name.
    pub fn list(&self) -> Result<Vec<PipelineConfig>> {
        Ok(self.load_all()?.into_values().collect())
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.load_all()?.into_keys().collect())
    }

    /// Serialize one stored config as pretty JSON.
    pub fn export(&self, name: &str) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.load(name)?)?)
    }

    /// Parse a JSON config and save it. Returns what was saved.
    pub fn import(&self, data: &[u8]) -> Result<PipelineConfig> {
        let config: PipelineConfig = serde_json::from_slice(data)?;
        self.save(&config)?;
        Ok(config)
    }

    #[cfg(feature = "yaml")]
    pub fn export_yaml(&self, name: &str) -> Result<String> {
        Ok(serde_yaml::to_string(&self.load(name)?)?)
    }

    #[cfg(feature = "yaml")]
    pub fn import_yaml(&self, data: &str) -> Result<PipelineConfig> {
        let config: PipelineConfig = serde_yaml::from_str(data)?;
        self.save(&config)?;
        Ok(config)
    }
}
