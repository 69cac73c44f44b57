//! Event hooks for pipeline lifecycle.
//!
//! Provides an optional, non-intrusive way to observe execution. Pipelines
//! emit events when they start and finish, when stages and rounds begin, when
//! provider calls are retried or fail, and when results are combined.
//! Implement [`EventHandler`] and attach it to the
//! [`ExecCtx`](crate::ExecCtx) to receive them.

/// Events emitted during pipeline execution.
#[derive(Debug, Clone)]
pub enum Event {
    /// A pipeline has started executing.
    PipelineStart {
        /// Instance name of the pipeline.
        name: String,
        /// Stable type identifier (e.g. `"serial"`, `"parallel"`).
        kind: &'static str,
    },
    /// A pipeline has finished executing.
    PipelineEnd {
        name: String,
        kind: &'static str,
        ok: bool,
    },
    /// A serial or nested stage is starting.
    StageStart {
        /// Pipeline that owns the stage.
        pipeline: String,
        /// 1-based stage index.
        stage: usize,
        /// Provider or sub-pipeline name.
        name: String,
    },
    /// A serial or nested stage finished.
    StageEnd {
        pipeline: String,
        stage: usize,
        name: String,
        ok: bool,
    },
    /// A collaborative round is starting.
    RoundStart {
        pipeline: String,
        /// 1-based round number.
        round: u32,
        total_rounds: u32,
    },
    /// A provider call failed and will be attempted again.
    ProviderRetry {
        provider: String,
        /// The attempt about to run (2 for the first retry).
        attempt: u32,
        /// Delay before the attempt in milliseconds.
        delay_ms: u64,
        reason: String,
    },
    /// A provider call failed for good (after retries).
    ProviderFailed { provider: String, reason: String },
    /// A combiner reduced several responses to one.
    Combined {
        combiner: &'static str,
        inputs: usize,
        selected_provider: String,
    },
}

/// Handler for pipeline lifecycle events.
///
/// This is entirely optional -- pipelines work without an event handler.
///
/// # Example
///
/// ```
/// use llm_orchestra::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::StageStart { stage, name, .. } => println!("[stage {}] {}", stage, name),
///             Event::ProviderRetry { provider, attempt, .. } => {
///                 println!("[retry] {} attempt {}", provider, attempt)
///             }
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called when a pipeline emits an event.
    fn on_event(&self, event: Event);
}

/// An [`EventHandler`] backed by a closure.
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

/// Handler that records every event, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl EventHandler for RecordingHandler {
    fn on_event(&self, event: Event) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
