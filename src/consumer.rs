//! Fixed pool of consumer threads draining the shared queue.
//!
//! Every worker runs the same loop: block in `dequeue`, measure how long the item sat in the
//! queue, execute it, and append the wait sample. Results are summed into a worker-local
//! accumulator and merged once when the pool is joined, so no total is shared between threads.

use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use crate::threading::{spawn_named, ThreadRole};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info};

/// Work done by one consumer thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorkerReport {
    pub worker: usize,
    pub consumed: u64,
    /// Sum of every executed item's result.
    pub accumulator: f64,
}

/// Merged totals of every worker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolReport {
    pub workers: Vec<WorkerReport>,
}

impl PoolReport {
    pub fn consumed(&self) -> u64 {
        self.workers.iter().map(|w| w.consumed).sum()
    }

    pub fn accumulator(&self) -> f64 {
        self.workers.iter().map(|w| w.accumulator).sum()
    }
}

/// Running consumer threads.
pub struct ConsumerPool {
    workers: Vec<(String, JoinHandle<WorkerReport>)>,
}

impl ConsumerPool {
    /// Spawn `size` workers on `context`'s queue.
    ///
    /// Workers are named `consumer-<n>` and run [`run_worker`] until they observe
    /// end-of-stream. Each reports completion to `context.coordinator` exactly once.
    ///
    /// # Arguments
    /// * `size` - Number of consumer threads
    /// * `context` - Shared run state; each worker holds its own clone
    ///
    /// # Returns
    /// The running pool, or the first `HarnessError::Spawn`. On a spawn failure production is
    /// marked ended so the workers already started drain and exit; they are joined before the
    /// error is returned.
    pub fn start(size: usize, context: &RunContext) -> Result<Self> {
        let mut workers = Vec::with_capacity(size);
        for worker in 0..size {
            let name = format!("consumer-{worker}");
            let ctx = context.clone();
            match spawn_named(name.clone(), ThreadRole::Consumer, move || {
                run_worker(worker, &ctx)
            }) {
                Ok(handle) => workers.push((name, handle)),
                Err(err) => {
                    context.queue.mark_production_ended();
                    let _ = ConsumerPool { workers }.join();
                    return Err(err);
                }
            }
        }
        debug!(workers = size, "consumer pool started");
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Join every worker. Only returns once all of them have exited.
    pub fn join(self) -> Result<PoolReport> {
        let mut report = PoolReport::default();
        let mut panicked = None;
        for (name, handle) in self.workers {
            match handle.join() {
                Ok(worker) => report.workers.push(worker),
                Err(_) => panicked = Some(name),
            }
        }
        match panicked {
            Some(name) => Err(HarnessError::ThreadPanicked(name)),
            None => Ok(report),
        }
    }
}

/// Consumer loop; returns after observing end-of-stream exactly once.
pub fn run_worker(worker: usize, context: &RunContext) -> WorkerReport {
    let mut consumed = 0u64;
    let mut accumulator = 0.0f64;

    while let Some(item) = context.queue.dequeue() {
        let dequeued = Instant::now();
        let waited = dequeued.saturating_duration_since(item.enqueued_at);

        accumulator += item.execute();
        consumed += 1;

        context.queue_wait.record(waited);
    }

    let finished = context.coordinator.consumer_finished();
    info!(worker, consumed, finished_consumers = finished, "consumer exiting");
    WorkerReport {
        worker,
        consumed,
        accumulator,
    }
}
