//! Completion notification
//!
//! Workers push every finished job into one channel; a single notifier
//! thread drains it and performs delivery. Having one consumer gives the
//! two guarantees callers rely on: callbacks fire in completion order, and
//! no two callback invocations for the same engine run concurrently.
//! Callback execution is still concurrent with the submitting threads, so
//! shared state inside a callback needs its own synchronization.

use crate::engine::EngineShared;
use crate::error::{EngineError, Result};
use crate::job::{Delivery, FinishedJob, JobId, ParkedResult, QueuedJob};
use crossbeam_channel::Receiver;
use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

/// A completed job as seen by the registered callback.
///
/// The output slice borrows the engine's buffer and is valid only for the
/// duration of the invocation; copy out anything that must outlive it.
pub struct Completion<'a> {
    /// Id of the completed job
    pub job_id: JobId,

    /// The job's outputs, or the failure being reported
    pub result: std::result::Result<&'a [u8], &'a EngineError>,

    /// The context value supplied at submission, if any
    pub context: Option<&'a (dyn Any + Send)>,
}

/// Registered completion callback.
///
/// Runs on the engine's notifier thread. The returned status is logged
/// when nonzero. Blocking engine calls (submit, wait, close) from inside
/// the callback can deadlock delivery; hand work off instead.
pub type CallbackFn = dyn Fn(Completion<'_>) -> i32 + Send + Sync;

/// Accumulator for one `run_batch` call.
///
/// Each member job records its result under its input index; the
/// submitting thread blocks until the expected number have landed.
pub(crate) struct BatchState {
    inner: Mutex<BatchInner>,
    done: Condvar,
}

struct BatchInner {
    results: Vec<Option<std::result::Result<Vec<u8>, EngineError>>>,
    completed: usize,
}

impl BatchState {
    pub(crate) fn new(len: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(BatchInner {
                results: (0..len).map(|_| None).collect(),
                completed: 0,
            }),
            done: Condvar::new(),
        })
    }

    pub(crate) fn record(&self, index: usize, result: std::result::Result<Vec<u8>, EngineError>) {
        let mut inner = self.inner.lock().expect("batch lock poisoned");
        if index < inner.results.len() && inner.results[index].is_none() {
            inner.results[index] = Some(result);
            inner.completed += 1;
        }
        drop(inner);
        self.done.notify_all();
    }

    /// Block until `expected` members have recorded, then take the results.
    pub(crate) fn wait_done(
        &self,
        expected: usize,
    ) -> Vec<Option<std::result::Result<Vec<u8>, EngineError>>> {
        let mut inner = self.inner.lock().expect("batch lock poisoned");
        while inner.completed < expected {
            inner = self.done.wait(inner).expect("batch lock poisoned");
        }
        std::mem::take(&mut inner.results)
    }
}

/// Spawn the notifier thread.
pub(crate) fn spawn(
    finished: Receiver<FinishedJob>,
    shared: Arc<EngineShared>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("dxnn-notifier".into())
        .spawn(move || notifier_loop(&finished, &shared))
        .map_err(|e| EngineError::memory_allocation(format!("failed to spawn notifier: {e}")))
}

fn notifier_loop(finished: &Receiver<FinishedJob>, shared: &Arc<EngineShared>) {
    // Exits when every worker has dropped its sender.
    while let Ok(done) = finished.recv() {
        deliver(done, shared);
    }
    tracing::debug!("Notifier for '{}' exiting", shared.model_name());
}

fn deliver(done: FinishedJob, shared: &Arc<EngineShared>) {
    let FinishedJob {
        job,
        outcome,
        inference_time,
    } = done;
    let QueuedJob {
        id,
        output,
        context,
        delivery,
        submitted_at,
        ..
    } = job;
    let latency = submitted_at.elapsed();

    if outcome.is_ok() {
        shared.record_latency(latency, inference_time);
    }

    match delivery {
        Delivery::Batch { batch, index } => {
            let result = outcome.map(|()| output.to_vec());
            drop(output); // buffer back to the pool before waking the batch
            batch.record(index, result);
            shared.settle(id, None);
        }

        Delivery::Async => {
            // Snapshot the registration; a replacement racing with this
            // completion takes effect from the next job.
            if let Some(callback) = shared.callback() {
                let result = match &outcome {
                    Ok(()) => Ok(&*output),
                    Err(e) => Err(e),
                };
                let status = callback(Completion {
                    job_id: JobId::new(id),
                    result,
                    context: context.as_deref(),
                });
                if status != 0 {
                    tracing::warn!("Callback returned status {status} for job_{id}");
                }
                drop(output);
                shared.settle(id, None);
            } else {
                park(shared, id, outcome, output, latency, inference_time);
            }
        }

        Delivery::Wait => {
            park(shared, id, outcome, output, latency, inference_time);
        }
    }
}

fn park(
    shared: &Arc<EngineShared>,
    id: u64,
    outcome: std::result::Result<(), EngineError>,
    output: crate::buffer::PooledBuffer,
    latency: std::time::Duration,
    inference_time: std::time::Duration,
) {
    let parked = outcome.map(|()| ParkedResult {
        buffer: output,
        latency,
        inference_time,
    });
    shared.settle(id, Some(parked));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_waits_for_expected_count() {
        let batch = BatchState::new(3);

        let batch2 = Arc::clone(&batch);
        let recorder = std::thread::spawn(move || {
            // Completion order differs from index order.
            batch2.record(2, Ok(vec![2]));
            batch2.record(0, Ok(vec![0]));
            batch2.record(1, Ok(vec![1]));
        });

        let results = batch.wait_done(3);
        recorder.join().unwrap();

        let values: Vec<u8> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap()[0])
            .collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_record_is_ignored() {
        let batch = BatchState::new(1);
        batch.record(0, Ok(vec![1]));
        batch.record(0, Ok(vec![9]));

        let results = batch.wait_done(1);
        assert_eq!(results[0].as_ref().unwrap().as_ref().unwrap(), &vec![1]);
    }
}
