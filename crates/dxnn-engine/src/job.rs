//! Job identity and lifecycle bookkeeping
//!
//! A job is one inference request. Ids are strictly increasing per engine
//! handle and never reused; the table below tracks every job from
//! submission until its result is consumed.

use crate::buffer::PooledBuffer;
use crate::error::EngineError;
use crate::notifier::BatchState;
use bytes::Bytes;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier of one submitted job, unique within its engine handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Rebuild an id from its numeric value (e.g. one that crossed an FFI
    /// or IPC boundary). Waiting on an id the engine never issued fails
    /// with `UnknownJob`.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Numeric value of the id
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job_{}", self.0)
    }
}

/// Opaque caller-supplied value carried with a job and handed back to the
/// completion callback
pub type UserContext = Box<dyn Any + Send>;

/// How a job's result leaves the engine
pub(crate) enum Delivery {
    /// Parked in the job table until a `wait` call consumes it
    Wait,
    /// Routed to the registered callback at completion time; parked for
    /// `wait` when no callback is registered
    Async,
    /// Collected by a batch accumulator, never the user callback
    Batch {
        batch: Arc<BatchState>,
        index: usize,
    },
}

/// A job travelling from submission to a worker slot
pub(crate) struct QueuedJob {
    pub(crate) id: u64,
    pub(crate) input: Bytes,
    pub(crate) output: PooledBuffer,
    pub(crate) context: Option<UserContext>,
    pub(crate) delivery: Delivery,
    pub(crate) submitted_at: Instant,
}

/// A job coming back from a worker slot
pub(crate) struct FinishedJob {
    pub(crate) job: QueuedJob,
    pub(crate) outcome: Result<(), EngineError>,
    /// Pure execution time on the worker
    pub(crate) inference_time: Duration,
}

/// A delivered result parked for `wait`
pub(crate) struct ParkedResult {
    pub(crate) buffer: PooledBuffer,
    /// Submission-to-completion latency
    pub(crate) latency: Duration,
    pub(crate) inference_time: Duration,
}

/// Lifecycle slot for one job.
///
/// PENDING and RUNNING are in-flight; `Done(Ok)` is COMPLETED and
/// `Done(Err)` is FAILED, both waiting to be consumed.
pub(crate) enum Slot {
    Pending,
    Running,
    Done(Result<ParkedResult, EngineError>),
}

/// Per-engine job bookkeeping, behind the engine's job lock
pub(crate) struct JobTable {
    slots: HashMap<u64, Slot>,
    /// PENDING + RUNNING count; drives close-time draining
    in_flight: usize,
}

impl JobTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            in_flight: 0,
        }
    }

    pub(crate) fn insert_pending(&mut self, id: u64) {
        let prev = self.slots.insert(id, Slot::Pending);
        debug_assert!(prev.is_none(), "job id reused");
        self.in_flight += 1;
    }

    pub(crate) fn mark_running(&mut self, id: u64) {
        if let Some(slot) = self.slots.get_mut(&id) {
            *slot = Slot::Running;
        }
    }

    /// Transition out of RUNNING; the slot is removed (already-consumed
    /// delivery) or parked for `wait`.
    pub(crate) fn settle(&mut self, id: u64, parked: Option<Result<ParkedResult, EngineError>>) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match parked {
            Some(result) => {
                self.slots.insert(id, Slot::Done(result));
            }
            None => {
                self.slots.remove(&id);
            }
        }
    }

    /// Remove a job that never reached a worker (failed submission).
    pub(crate) fn abandon(&mut self, id: u64) {
        if self.slots.remove(&id).is_some() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
    }

    pub(crate) fn get(&self, id: u64) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub(crate) fn take_done(&mut self, id: u64) -> Option<Result<ParkedResult, EngineError>> {
        match self.slots.get(&id) {
            Some(Slot::Done(_)) => match self.slots.remove(&id) {
                Some(Slot::Done(result)) => Some(result),
                _ => None,
            },
            _ => None,
        }
    }

    pub(crate) const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Drop every parked result (close-time discard of unconsumed output).
    /// Returns how many results were discarded.
    pub(crate) fn discard_parked(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !matches!(slot, Slot::Done(_)));
        before - self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_tracks_pending_and_running() {
        let mut table = JobTable::new();
        table.insert_pending(1);
        table.insert_pending(2);
        assert_eq!(table.in_flight(), 2);

        table.mark_running(1);
        assert_eq!(table.in_flight(), 2);

        table.settle(1, None);
        assert_eq!(table.in_flight(), 1);
        assert!(table.get(1).is_none());

        table.settle(2, Some(Err(EngineError::inference_failed("boom"))));
        assert_eq!(table.in_flight(), 0);
        assert!(matches!(table.get(2), Some(Slot::Done(Err(_)))));
    }

    #[test]
    fn take_done_consumes_once() {
        let mut table = JobTable::new();
        table.insert_pending(7);
        table.settle(7, Some(Err(EngineError::inference_failed("x"))));

        assert!(table.take_done(7).is_some());
        assert!(table.take_done(7).is_none());
        assert!(table.get(7).is_none());
    }

    #[test]
    fn discard_parked_leaves_in_flight_jobs() {
        let mut table = JobTable::new();
        table.insert_pending(1);
        table.insert_pending(2);
        table.settle(1, Some(Err(EngineError::inference_failed("x"))));

        assert_eq!(table.discard_parked(), 1);
        assert!(table.get(2).is_some());
        assert_eq!(table.in_flight(), 1);
    }
}
