//! Asynchronous inference dispatch engine for DXNN NPUs.
//!
//! One [`InferenceEngine`] per loaded model. Jobs flow submission-queue →
//! worker slots (one per NPU core) → completion notifier:
//!
//! ```text
//! run / run_async / run_batch
//!        │  (blocks when all output buffers are in flight)
//!        ▼
//!   submission queue ──► worker slots ──► completion notifier
//!                        (FIFO pickup,     (callback, wait parking,
//!                         any idle core)    or batch collection)
//! ```
//!
//! Results come back one of three ways: a synchronous [`run`] return, a
//! [`wait`] on the job id from [`run_async`], or the registered
//! completion callback. Each job is delivered exactly once.
//!
//! # Quick start
//!
//! ```no_run
//! use dxnn_engine::{EngineOptions, InferenceEngine};
//!
//! # fn main() -> dxnn_engine::Result<()> {
//! let engine = InferenceEngine::open("model.dxnn", EngineOptions::default())?;
//!
//! // Async submissions with a job handle:
//! let input = vec![0u8; engine.input_size()];
//! let job = engine.run_async(&input, None)?;
//! let output = engine.wait(job)?;
//! println!("job {} -> {} bytes", output.job_id(), output.len());
//! # Ok(())
//! # }
//! ```
//!
//! [`run`]: InferenceEngine::run
//! [`wait`]: InferenceEngine::wait
//! [`run_async`]: InferenceEngine::run_async

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]

mod backend;
pub mod backends;
mod buffer;
mod engine;
mod error;
mod job;
mod notifier;
mod options;
mod worker;

pub use backend::{select_backend, BackendType, ComputeBackend};
pub use backends::{DeviceBackend, SoftwareBackend};
pub use buffer::PooledBuffer;
pub use engine::{InferenceEngine, InferenceOutput};
pub use error::{EngineError, Result};
pub use job::{JobId, UserContext};
pub use notifier::{CallbackFn, Completion};
pub use options::{
    BackendSelection, EngineOptions, BUFFER_COUNT_ENV, DEFAULT_BUFFER_COUNT,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        BackendSelection, Completion, EngineError, EngineOptions, InferenceEngine,
        InferenceOutput, JobId, Result, SoftwareBackend,
    };
}
