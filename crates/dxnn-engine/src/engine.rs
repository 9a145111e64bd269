//! Engine handle and dispatch core
//!
//! One `InferenceEngine` per loaded model instance. The handle owns the
//! output buffer pool, the worker pool, and the completion notifier; it is
//! OPEN from construction, enters CLOSING when `close` starts draining,
//! and is CLOSED once teardown finishes. Dropping the handle closes it.

use crate::backend::{select_backend, BackendType, ComputeBackend};
use crate::buffer::{BufferPool, PooledBuffer};
use crate::error::{EngineError, Result};
use crate::job::{Delivery, JobId, JobTable, ParkedResult, QueuedJob, Slot, UserContext};
use crate::notifier::{self, BatchState, CallbackFn, Completion};
use crate::options::EngineOptions;
use crate::worker;
use bytes::Bytes;
use crossbeam_channel::Sender;
use dxnn_device::{EventCode, EventKind, EventLevel, RuntimeEventDispatcher};
use dxnn_model::Model;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// State shared between the handle, the workers, and the notifier
pub(crate) struct EngineShared {
    model_name: String,
    jobs: Mutex<JobTable>,
    jobs_cv: Condvar,
    callback: Mutex<Option<Arc<CallbackFn>>>,
    events: Arc<RuntimeEventDispatcher>,
    stats: Mutex<LatencyStats>,
}

#[derive(Default)]
struct LatencyStats {
    count: u64,
    total_latency_us: u128,
    total_inference_us: u128,
}

impl EngineShared {
    pub(crate) fn model_name(&self) -> &str {
        &self.model_name
    }

    pub(crate) fn events(&self) -> &Arc<RuntimeEventDispatcher> {
        &self.events
    }

    /// Snapshot of the registered callback
    pub(crate) fn callback(&self) -> Option<Arc<CallbackFn>> {
        self.callback.lock().expect("callback lock poisoned").clone()
    }

    pub(crate) fn mark_running(&self, id: u64) {
        self.jobs.lock().expect("job table lock poisoned").mark_running(id);
    }

    /// Transition a job out of RUNNING and wake waiters (including a
    /// draining `close`).
    pub(crate) fn settle(&self, id: u64, parked: Option<std::result::Result<ParkedResult, EngineError>>) {
        let mut jobs = self.jobs.lock().expect("job table lock poisoned");
        jobs.settle(id, parked);
        drop(jobs);
        self.jobs_cv.notify_all();
    }

    pub(crate) fn record_latency(&self, latency: Duration, inference_time: Duration) {
        let mut stats = self.stats.lock().expect("stats lock poisoned");
        stats.count += 1;
        stats.total_latency_us += latency.as_micros();
        stats.total_inference_us += inference_time.as_micros();
    }
}

/// Outputs of one completed job, on loan from the engine's buffer pool.
///
/// Dereferences to the raw output bytes. Dropping the value returns the
/// buffer to the pool and releases the job's unit of backpressure, so
/// hold it only as long as the data is needed.
pub struct InferenceOutput {
    job_id: JobId,
    data: PooledBuffer,
    latency: Duration,
    inference_time: Duration,
}

impl InferenceOutput {
    /// Id of the job that produced this output
    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Submission-to-completion latency
    pub const fn latency(&self) -> Duration {
        self.latency
    }

    /// Pure execution time on the worker slot
    pub const fn inference_time(&self) -> Duration {
        self.inference_time
    }
}

impl Deref for InferenceOutput {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for InferenceOutput {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for InferenceOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceOutput")
            .field("job_id", &self.job_id)
            .field("len", &self.data.len())
            .field("latency", &self.latency)
            .finish()
    }
}

/// Runtime inference executor for one loaded model
///
/// Submissions go through [`run`](Self::run) (synchronous),
/// [`run_async`](Self::run_async) (job-id + callback or
/// [`wait`](Self::wait)), and [`run_batch`](Self::run_batch). At most
/// `buffer_count` jobs are in flight at once; past that, submission blocks
/// the calling thread until a prior result is consumed.
///
/// ```no_run
/// use dxnn_engine::{EngineOptions, InferenceEngine};
///
/// # fn main() -> dxnn_engine::Result<()> {
/// let engine = InferenceEngine::open("model.dxnn", EngineOptions::default())?;
/// let input = vec![0u8; engine.input_size()];
/// let output = engine.run(&input)?;
/// println!("{} output bytes in {:?}", output.len(), output.latency());
/// # Ok(())
/// # }
/// ```
pub struct InferenceEngine {
    model: Model,
    backend_type: BackendType,
    buffer_count: usize,
    core_count: usize,
    drain_timeout: Duration,

    shared: Arc<EngineShared>,
    pool: Arc<BufferPool>,
    next_id: AtomicU64,
    submit_tx: Mutex<Option<Sender<QueuedJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    notifier: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    close_lock: Mutex<()>,
}

impl InferenceEngine {
    /// Load a model and open an engine for it.
    ///
    /// # Errors
    ///
    /// Returns `ModelLoad` for a missing or malformed model file, or any
    /// error from backend selection and resource allocation.
    pub fn open(model_path: impl AsRef<Path>, options: EngineOptions) -> Result<Self> {
        let model = Model::from_file(model_path)?;
        let backend = select_backend(options.backend, &model)?;
        Self::with_backend(model, backend, options)
    }

    /// Open an engine over an explicit backend.
    ///
    /// This is the embedding/testing entry point: the model and the
    /// compute boundary are supplied directly instead of resolved from a
    /// file and the device scan.
    ///
    /// # Errors
    ///
    /// Returns an error if resources cannot be allocated.
    pub fn with_backend(
        model: Model,
        backend: Arc<dyn ComputeBackend>,
        options: EngineOptions,
    ) -> Result<Self> {
        let buffer_count = options.resolved_buffer_count();
        let core_count = options.cores.unwrap_or_else(|| backend.core_count()).max(1);
        let events = options
            .dispatcher
            .clone()
            .unwrap_or_else(|| Arc::clone(RuntimeEventDispatcher::global()));

        let pool = BufferPool::new(buffer_count, model.output_size())?;
        let shared = Arc::new(EngineShared {
            model_name: model.name().to_string(),
            jobs: Mutex::new(JobTable::new()),
            jobs_cv: Condvar::new(),
            callback: Mutex::new(None),
            events,
            stats: Mutex::new(LatencyStats::default()),
        });

        let (submit_tx, submit_rx) = crossbeam_channel::unbounded();
        let (finished_tx, finished_rx) = crossbeam_channel::unbounded();

        let backend_type = backend.backend_type();
        let workers = worker::spawn(core_count, &submit_rx, &finished_tx, &backend, &shared)?;
        // Workers hold the only finished-senders and submit-receivers now;
        // dropping ours lets shutdown propagate through the channels.
        drop(finished_tx);
        drop(submit_rx);

        let notifier = notifier::spawn(finished_rx, Arc::clone(&shared))?;

        tracing::info!(
            "Engine '{}' open: {core_count} worker slot(s), {buffer_count} buffer(s), {backend_type} backend",
            model.name()
        );

        Ok(Self {
            model,
            backend_type,
            buffer_count,
            core_count,
            drain_timeout: options.drain_timeout,
            shared,
            pool,
            next_id: AtomicU64::new(1),
            submit_tx: Mutex::new(Some(submit_tx)),
            workers: Mutex::new(workers),
            notifier: Mutex::new(Some(notifier)),
            closed: AtomicBool::new(false),
            close_lock: Mutex::new(()),
        })
    }

    /// The loaded model
    pub const fn model(&self) -> &Model {
        &self.model
    }

    /// Model name
    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// Input size of one inference in bytes
    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    /// Output size of one inference in bytes
    pub fn output_size(&self) -> usize {
        self.model.output_size()
    }

    /// Which backend executes this engine's jobs
    pub const fn backend_type(&self) -> BackendType {
        self.backend_type
    }

    /// Configured in-flight bound
    pub const fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Number of worker slots
    pub const fn core_count(&self) -> usize {
        self.core_count
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mean submission-to-completion latency over all completed jobs, in
    /// microseconds
    pub fn latency_mean_us(&self) -> f64 {
        let stats = self.shared.stats.lock().expect("stats lock poisoned");
        if stats.count == 0 {
            return 0.0;
        }
        stats.total_latency_us as f64 / stats.count as f64
    }

    /// Mean pure execution time over all completed jobs, in microseconds
    pub fn inference_time_mean_us(&self) -> f64 {
        let stats = self.shared.stats.lock().expect("stats lock poisoned");
        if stats.count == 0 {
            return 0.0;
        }
        stats.total_inference_us as f64 / stats.count as f64
    }

    /// Number of completed jobs measured so far
    pub fn latency_count(&self) -> u64 {
        self.shared.stats.lock().expect("stats lock poisoned").count
    }

    /// Synchronous inference: submit one job and block for its outputs.
    ///
    /// Executes on exactly one worker slot; use [`run_async`](Self::run_async)
    /// or [`run_batch`](Self::run_batch) to keep multiple cores busy.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a wrong-sized input, `EngineClosed` after close,
    /// `InferenceFailed` if the job failed.
    pub fn run(&self, input: &[u8]) -> Result<InferenceOutput> {
        let job_id = self.submit(input, None, Delivery::Wait)?;
        self.wait(job_id)
    }

    /// Submit an asynchronous inference job.
    ///
    /// Returns as soon as the job is queued. If the engine already has
    /// `buffer_count` jobs in flight, the call blocks until a prior
    /// result is consumed (backpressure; never a capacity error).
    ///
    /// The result is delivered to the registered callback, or parked for
    /// [`wait`](Self::wait) when none is registered at completion time.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a wrong-sized input, `EngineClosed` after close.
    pub fn run_async(&self, input: &[u8], context: Option<UserContext>) -> Result<JobId> {
        self.submit(input, context, Delivery::Async)
    }

    /// Synchronous batch inference.
    ///
    /// The batch is enqueued as one unit; each member executes as an
    /// independent schedulable job across the worker slots. Blocks until
    /// every member has completed and returns their outputs in input
    /// order, regardless of completion order.
    ///
    /// # Errors
    ///
    /// Any member failure fails the whole call with the first error in
    /// input order (after every member has finished).
    pub fn run_batch<I: AsRef<[u8]>>(&self, inputs: &[I]) -> Result<Vec<Vec<u8>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let batch = BatchState::new(inputs.len());
        let mut submitted = 0usize;
        let mut submit_err = None;
        for (index, input) in inputs.iter().enumerate() {
            let delivery = Delivery::Batch {
                batch: Arc::clone(&batch),
                index,
            };
            match self.submit(input.as_ref(), None, delivery) {
                Ok(_) => submitted += 1,
                Err(e) => {
                    submit_err = Some(e);
                    break;
                }
            }
        }

        // Let every member that made it in land before reporting anything.
        let results = batch.wait_done(submitted);
        if let Some(e) = submit_err {
            return Err(e);
        }

        let mut outputs = Vec::with_capacity(results.len());
        for (index, slot) in results.into_iter().enumerate() {
            match slot {
                Some(Ok(data)) => outputs.push(data),
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(EngineError::inference_failed(format!(
                        "batch member {index} was never delivered"
                    )))
                }
            }
        }
        Ok(outputs)
    }

    /// Block until the given job reaches COMPLETED or FAILED and consume
    /// its result.
    ///
    /// # Errors
    ///
    /// `UnknownJob` for an id that was never issued or whose result was
    /// already consumed (including by the callback); `EngineClosed` after
    /// close; `InferenceFailed` if the job failed.
    pub fn wait(&self, job_id: JobId) -> Result<InferenceOutput> {
        if self.is_closed() {
            return Err(EngineError::EngineClosed);
        }

        let id = job_id.as_u64();
        let mut jobs = self.shared.jobs.lock().expect("job table lock poisoned");
        loop {
            match jobs.get(id) {
                None => {
                    // A close racing with this wait discards parked results;
                    // report the closure, not a phantom id.
                    if self.is_closed() {
                        return Err(EngineError::EngineClosed);
                    }
                    return Err(EngineError::UnknownJob { id });
                }
                Some(Slot::Pending | Slot::Running) => {
                    jobs = self
                        .shared
                        .jobs_cv
                        .wait(jobs)
                        .expect("job table lock poisoned");
                }
                Some(Slot::Done(_)) => break,
            }
        }

        match jobs.take_done(id) {
            Some(result) => result.map(|parked| InferenceOutput {
                job_id,
                data: parked.buffer,
                latency: parked.latency,
                inference_time: parked.inference_time,
            }),
            None => Err(EngineError::UnknownJob { id }),
        }
    }

    /// Register the completion callback, replacing any previous one.
    ///
    /// The callback runs on the engine's notifier thread, serialized per
    /// engine, in job-completion order. Outputs borrowed by the
    /// [`Completion`] are valid only during the invocation.
    pub fn register_callback(
        &self,
        callback: impl Fn(Completion<'_>) -> i32 + Send + Sync + 'static,
    ) {
        let mut slot = self.shared.callback.lock().expect("callback lock poisoned");
        if slot.is_some() {
            tracing::debug!("Replacing completion callback for '{}'", self.name());
        }
        *slot = Some(Arc::new(callback));
    }

    /// Remove the registered callback; later completions park for `wait`.
    pub fn clear_callback(&self) {
        *self.shared.callback.lock().expect("callback lock poisoned") = None;
    }

    /// Throughput benchmark: dispatch `iterations` copies of `input`
    /// across all worker slots and return inferences per second.
    ///
    /// # Errors
    ///
    /// Propagates the first submission or execution error.
    pub fn run_benchmark(&self, iterations: usize, input: &[u8]) -> Result<f64> {
        if iterations == 0 {
            return Ok(0.0);
        }

        let started = Instant::now();
        let batch = BatchState::new(iterations);
        for index in 0..iterations {
            let delivery = Delivery::Batch {
                batch: Arc::clone(&batch),
                index,
            };
            self.submit(input, None, delivery)?;
        }
        let results = batch.wait_done(iterations);
        for slot in results {
            if let Some(Err(e)) = slot {
                return Err(e);
            }
        }
        Ok(iterations as f64 / started.elapsed().as_secs_f64())
    }

    /// Drain in-flight jobs and tear the engine down.
    ///
    /// Blocks until every PENDING/RUNNING job has reached COMPLETED or
    /// FAILED, or until the drain timeout elapses; a stuck drain is
    /// reported (CRITICAL timeout event) but does not prevent teardown.
    /// Unconsumed parked results are discarded. Safe to call from any
    /// thread, idempotent; also runs on drop.
    pub fn close(&self) {
        let _guard = self.close_lock.lock().expect("close lock poisoned");
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        tracing::info!("Closing engine '{}'", self.name());

        let deadline = Instant::now() + self.drain_timeout;
        let mut jobs = self.shared.jobs.lock().expect("job table lock poisoned");
        let mut drained = true;
        while jobs.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                drained = false;
                break;
            }
            let (guard, _timeout) = self
                .shared
                .jobs_cv
                .wait_timeout(jobs, deadline - now)
                .expect("job table lock poisoned");
            jobs = guard;
        }

        let stuck = jobs.in_flight();
        let discarded = jobs.discard_parked();
        drop(jobs);
        self.shared.jobs_cv.notify_all();

        if !drained {
            tracing::error!(
                "Engine '{}': drain timed out with {stuck} job(s) still in flight",
                self.name()
            );
            self.shared.events.dispatch(
                EventLevel::Critical,
                EventKind::DeviceCore,
                EventCode::TimeoutOccurred,
                format!(
                    "close: {stuck} job(s) stuck past {:?} on '{}'",
                    self.drain_timeout,
                    self.name()
                ),
            );
        }
        if discarded > 0 {
            tracing::warn!(
                "Engine '{}': discarding {discarded} unconsumed result(s) at close",
                self.name()
            );
        }

        // Stop intake, fail blocked submitters, run the pipeline down.
        drop(self.submit_tx.lock().expect("submit lock poisoned").take());
        self.pool.close();

        if drained {
            let workers = std::mem::take(&mut *self.workers.lock().expect("worker lock poisoned"));
            for handle in workers {
                if handle.join().is_err() {
                    tracing::error!("Worker thread panicked during close");
                }
            }
            let notifier = self.notifier.lock().expect("notifier lock poisoned").take();
            if let Some(handle) = notifier {
                if handle.join().is_err() {
                    tracing::error!("Notifier thread panicked during close");
                }
            }
        } else {
            // A stuck worker would block join forever; detach the threads
            // and let them exit when the channels disconnect.
            self.workers.lock().expect("worker lock poisoned").clear();
            self.notifier.lock().expect("notifier lock poisoned").take();
        }

        tracing::info!("Engine '{}' closed", self.name());
    }

    /// Validate, reserve a buffer (the backpressure point), and enqueue.
    fn submit(
        &self,
        input: &[u8],
        context: Option<UserContext>,
        delivery: Delivery,
    ) -> Result<JobId> {
        if self.is_closed() {
            return Err(EngineError::EngineClosed);
        }

        let expected = self.model.input_size();
        if input.len() != expected {
            return Err(EngineError::InvalidInput {
                expected,
                actual: input.len(),
            });
        }

        // Blocks while all `buffer_count` buffers are held by in-flight or
        // unconsumed jobs.
        let output = self.pool.acquire()?;

        if self.is_closed() {
            return Err(EngineError::EngineClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .jobs
            .lock()
            .expect("job table lock poisoned")
            .insert_pending(id);

        let sender = self
            .submit_tx
            .lock()
            .expect("submit lock poisoned")
            .clone();
        let Some(sender) = sender else {
            self.abandon(id);
            return Err(EngineError::EngineClosed);
        };

        let job = QueuedJob {
            id,
            input: Bytes::copy_from_slice(input),
            output,
            context,
            delivery,
            submitted_at: Instant::now(),
        };
        if sender.send(job).is_err() {
            self.abandon(id);
            return Err(EngineError::EngineClosed);
        }

        tracing::trace!("Submitted job_{id} to '{}'", self.name());
        Ok(JobId::new(id))
    }

    fn abandon(&self, id: u64) {
        self.shared
            .jobs
            .lock()
            .expect("job table lock poisoned")
            .abandon(id);
        self.shared.jobs_cv.notify_all();
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("model", &self.model.name())
            .field("backend", &self.backend_type)
            .field("buffer_count", &self.buffer_count)
            .field("core_count", &self.core_count)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
