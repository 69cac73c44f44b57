use thiserror::Error;

/// Errors produced by pipelines, combiners, and the config layer.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A single provider call failed (network, auth, vendor-side error).
    #[error("provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// A stage of a serial or nested pipeline failed. `stage` is 1-based.
    #[error("stage {stage} ({name}) failed: {source}")]
    StageFailed {
        stage: usize,
        name: String,
        source: Box<PipelineError>,
    },

    /// A provider's turn in a collaborative discussion failed.
    #[error("round {round}: provider '{provider}' failed: {source}")]
    RoundFailed {
        round: u32,
        provider: String,
        source: Box<PipelineError>,
    },

    /// Every provider in a fan-out or failover group failed.
    #[error("all {count} providers failed: {}", .errors.join("; "))]
    AllProvidersFailed { count: usize, errors: Vec<String> },

    /// Result combination failed (empty input, evaluator failure, no quorum).
    #[error("combine failed: {0}")]
    Combine(String),

    /// The execution context was cancelled.
    #[error("context cancelled")]
    Cancelled,

    /// The execution context's deadline passed before the call completed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A provider name could not be resolved through the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// A combiner name could not be resolved through the registry.
    #[error("unknown combiner: {0}")]
    UnknownCombiner(String),

    /// No stored pipeline configuration with this name.
    #[error("pipeline config '{0}' not found")]
    ConfigNotFound(String),

    /// Reading or writing the config store failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML (de)serialization failed.
    #[cfg(feature = "yaml")]
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Shorthand for a provider failure.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a cancellation or deadline rather than a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Cancelled | PipelineError::DeadlineExceeded)
    }

    /// Whether another attempt at the same call could succeed.
    ///
    /// Only transport-level failures qualify. Combination, configuration, and
    /// wrapped stage/round/aggregate errors come from a composed pipeline and
    /// are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider { .. } | PipelineError::Other(_) | PipelineError::Io(_)
        )
    }

    /// Annotate with a 1-based stage index. Cancellation passes through unwrapped.
    pub(crate) fn in_stage(self, stage: usize, name: impl Into<String>) -> Self {
        if self.is_cancellation() {
            return self;
        }
        PipelineError::StageFailed {
            stage,
            name: name.into(),
            source: Box::new(self),
        }
    }

    /// Annotate with a discussion round. Cancellation passes through unwrapped.
    pub(crate) fn in_round(self, round: u32, provider: impl Into<String>) -> Self {
        if self.is_cancellation() {
            return self;
        }
        PipelineError::RoundFailed {
            round,
            provider: provider.into(),
            source: Box::new(self),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
