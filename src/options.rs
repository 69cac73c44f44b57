//! Typed runtime options for pipelines.
//!
//! [`PipelineOptions`] is what pipelines actually consume. Persisted configs
//! carry options as a free-form JSON map; [`PipelineOptions::from_map`]
//! converts and validates that map at build time.

use crate::error::{PipelineError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

/// How a high-availability pipeline uses its providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaMode {
    /// Try providers one at a time in list order; first success wins.
    #[default]
    Failover,
    /// Dispatch every provider at once; first success wins.
    Race,
}

impl FromStr for HaMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "failover" | "fallback" | "sequential" => Ok(HaMode::Failover),
            "race" | "parallel" => Ok(HaMode::Race),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown ha_mode '{}' (expected 'failover' or 'race')",
                other
            ))),
        }
    }
}

/// Options shared by every pipeline variant.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Total attempts per provider call. 1 means no retry.
    pub max_retries: u32,
    /// Delay before the first retry. Default: none.
    pub retry_delay: Duration,
    /// Multiplier applied to the delay after each retry. Default: 2.0.
    pub retry_multiplier: f64,
    /// Cap on the retry delay. Default: 30 seconds.
    pub max_retry_delay: Duration,
    /// Temperature for provider calls made by the pipeline itself.
    pub temperature: f64,
    /// Token budget for provider calls made by the pipeline itself.
    pub max_tokens: u32,
    /// Parallel fan-out limit. `None` dispatches every provider at once.
    pub max_concurrency: Option<usize>,
    /// Temperature of the collaborative synthesis call.
    pub synthesis_temperature: f64,
    pub ha_mode: HaMode,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            retry_delay: Duration::ZERO,
            retry_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
            temperature: crate::types::DEFAULT_TEMPERATURE,
            max_tokens: crate::types::DEFAULT_MAX_TOKENS,
            max_concurrency: None,
            synthesis_temperature: 0.3,
            ha_mode: HaMode::Failover,
        }
    }
}

impl PipelineOptions {
    pub fn with_max_retries(mut self, attempts: u32) -> Self {
        self.max_retries = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn with_synthesis_temperature(mut self, temp: f64) -> Self {
        self.synthesis_temperature = temp;
        self
    }

    pub fn with_ha_mode(mut self, mode: HaMode) -> Self {
        self.ha_mode = mode;
        self
    }

    /// The retry policy these options describe.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.max(1),
            initial_delay: self.retry_delay,
            multiplier: self.retry_multiplier,
            max_delay: self.max_retry_delay,
        }
    }

    /// Build options from a persisted config's `options` map.
    ///
    /// Unrecognized keys are ignored. Recognized keys with the wrong type are
    /// a configuration error.
    pub fn from_map<'a, I>(map: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut opts = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "max_retries" => opts.max_retries = as_u64(key, value)?.max(1) as u32,
                "retry_delay_ms" => opts.retry_delay = Duration::from_millis(as_u64(key, value)?),
                "retry_multiplier" => opts.retry_multiplier = as_f64(key, value)?,
                "max_retry_delay_ms" => {
                    opts.max_retry_delay = Duration::from_millis(as_u64(key, value)?)
                }
                "temperature" => opts.temperature = as_f64(key, value)?,
                "max_tokens" => opts.max_tokens = as_u64(key, value)? as u32,
                "max_concurrency" => {
                    opts.max_concurrency = Some((as_u64(key, value)? as usize).max(1))
                }
                "synthesis_temperature" => opts.synthesis_temperature = as_f64(key, value)?,
                "ha_mode" => {
                    let s = value.as_str().ok_or_else(|| type_error(key, "a string"))?;
                    opts.ha_mode = s.parse()?;
                }
                other => tracing::debug!(option = other, "ignoring unrecognized pipeline option"),
            }
        }
        Ok(opts)
    }
}

fn type_error(key: &str, expected: &str) -> PipelineError {
    PipelineError::InvalidConfig(format!("option '{}' must be {}", key, expected))
}

fn as_u64(key: &str, value: &Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| type_error(key, "a non-negative integer"))
}

fn as_f64(key: &str, value: &Value) -> Result<f64> {
    value.as_f64().ok_or_else(|| type_error(key, "a number"))
}
