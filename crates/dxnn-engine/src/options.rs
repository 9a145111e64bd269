//! Engine configuration

use dxnn_device::RuntimeEventDispatcher;
use std::sync::Arc;
use std::time::Duration;

/// Default number of output buffers (and so of in-flight jobs) per engine
pub const DEFAULT_BUFFER_COUNT: usize = 6;

/// Environment variable overriding [`DEFAULT_BUFFER_COUNT`]
pub const BUFFER_COUNT_ENV: &str = "DXNN_TASK_MAX_LOAD";

/// Configuration for one engine handle
///
/// ```no_run
/// use dxnn_engine::{EngineOptions, InferenceEngine};
///
/// # fn main() -> dxnn_engine::Result<()> {
/// let engine = InferenceEngine::open(
///     "model.dxnn",
///     EngineOptions::default().with_buffer_count(4),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Output buffers to allocate; bounds the number of in-flight jobs.
    /// `None` resolves from `DXNN_TASK_MAX_LOAD`, then the default of 6.
    pub buffer_count: Option<usize>,

    /// Worker slots to run. `None` uses one per NPU core reported by the
    /// selected backend.
    pub cores: Option<usize>,

    /// How long `close` waits for in-flight jobs before reporting a stuck
    /// drain and proceeding with teardown.
    pub drain_timeout: Duration,

    /// Backend selection strategy
    pub backend: BackendSelection,

    /// Event dispatcher to report through. `None` uses the process-wide
    /// dispatcher; tests inject their own.
    pub dispatcher: Option<Arc<RuntimeEventDispatcher>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            buffer_count: None,
            cores: None,
            drain_timeout: Duration::from_secs(10),
            backend: BackendSelection::Auto,
            dispatcher: None,
        }
    }
}

impl EngineOptions {
    /// Set the output buffer count
    #[must_use]
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = Some(count);
        self
    }

    /// Set the worker slot count
    #[must_use]
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = Some(cores);
        self
    }

    /// Set the backend selection strategy
    #[must_use]
    pub fn with_backend(mut self, backend: BackendSelection) -> Self {
        self.backend = backend;
        self
    }

    /// Set the event dispatcher
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<RuntimeEventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Resolve the effective buffer count: explicit option, then the
    /// `DXNN_TASK_MAX_LOAD` environment variable, then the default.
    pub(crate) fn resolved_buffer_count(&self) -> usize {
        if let Some(count) = self.buffer_count {
            return count;
        }
        if let Ok(raw) = std::env::var(BUFFER_COUNT_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(count) if count > 0 => {
                    tracing::info!("Using {BUFFER_COUNT_ENV}={count} from environment");
                    return count;
                }
                _ => {
                    tracing::warn!(
                        "Invalid {BUFFER_COUNT_ENV} value {raw:?}, using default {DEFAULT_BUFFER_COUNT}"
                    );
                }
            }
        }
        DEFAULT_BUFFER_COUNT
    }
}

/// Backend selection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendSelection {
    /// Use the NPU device when one is present, otherwise the software
    /// backend.
    #[default]
    Auto,

    /// Require an NPU device; fail if none can be opened.
    Device,

    /// Force the software backend (CI, development, no hardware).
    Software,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_count_wins() {
        let options = EngineOptions::default().with_buffer_count(2);
        assert_eq!(options.resolved_buffer_count(), 2);
    }

    #[test]
    fn env_override_applies() {
        // Only this test touches the variable.
        std::env::set_var(BUFFER_COUNT_ENV, "9");
        let options = EngineOptions::default();
        assert_eq!(options.resolved_buffer_count(), 9);

        std::env::set_var(BUFFER_COUNT_ENV, "zero");
        assert_eq!(options.resolved_buffer_count(), DEFAULT_BUFFER_COUNT);
        std::env::remove_var(BUFFER_COUNT_ENV);
    }
}
