//! Worker dispatch pool
//!
//! One worker thread per NPU core. All workers pull from a single FIFO
//! channel, so dispatch follows submission order; completion order is
//! whatever execution latency makes of it.

use crate::backend::ComputeBackend;
use crate::engine::EngineShared;
use crate::error::{EngineError, Result};
use crate::job::{FinishedJob, QueuedJob};
use crossbeam_channel::{Receiver, Sender};
use dxnn_device::{EventCode, EventKind, EventLevel};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Spawn the worker pool.
///
/// Every worker holds a clone of `finished`; the notifier shuts down once
/// the last worker exits and drops its sender.
pub(crate) fn spawn(
    count: usize,
    jobs: &Receiver<QueuedJob>,
    finished: &Sender<FinishedJob>,
    backend: &Arc<dyn ComputeBackend>,
    shared: &Arc<EngineShared>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::with_capacity(count);
    for slot in 0..count {
        let jobs = jobs.clone();
        let finished = finished.clone();
        let backend = Arc::clone(backend);
        let shared = Arc::clone(shared);

        let handle = std::thread::Builder::new()
            .name(format!("dxnn-worker-{slot}"))
            .spawn(move || worker_loop(slot, &jobs, &finished, &*backend, &shared))
            .map_err(|e| {
                EngineError::memory_allocation(format!("failed to spawn worker {slot}: {e}"))
            })?;
        handles.push(handle);
    }
    Ok(handles)
}

fn worker_loop(
    slot: usize,
    jobs: &Receiver<QueuedJob>,
    finished: &Sender<FinishedJob>,
    backend: &dyn ComputeBackend,
    shared: &Arc<EngineShared>,
) {
    tracing::debug!("Worker {slot} up ({})", backend.backend_type());

    // Exits when the engine drops the submission sender and the queue is
    // drained.
    while let Ok(mut job) = jobs.recv() {
        shared.mark_running(job.id);
        tracing::trace!("Worker {slot} executing job_{}", job.id);

        let started = Instant::now();
        let outcome = backend.infer(&job.input, &mut job.output);
        let inference_time = started.elapsed();

        if let Err(e) = &outcome {
            tracing::error!("Worker {slot}: job_{} failed: {e}", job.id);
            shared.events().dispatch(
                EventLevel::Error,
                EventKind::DeviceCore,
                EventCode::DeviceEvent,
                format!("job_{} failed on worker {slot}: {e}", job.id),
            );
        }

        let id = job.id;
        if finished
            .send(FinishedJob {
                job,
                outcome,
                inference_time,
            })
            .is_err()
        {
            // Notifier is gone; nothing left to deliver to.
            tracing::warn!("Worker {slot}: completion channel closed, dropping job_{id}");
            break;
        }
    }

    tracing::debug!("Worker {slot} exiting");
}
