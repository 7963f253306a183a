//! Shared state handed to every timer and consumer thread of one run.

use crate::error::Result;
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownCoordinator;
use crate::stats::{DropCounter, QueueWaitStats, StatsSink};
use crate::work::WorkItem;
use std::sync::Arc;

/// Everything the threads of a run share. Cloning is cheap (reference counts only).
#[derive(Clone)]
pub struct RunContext {
    pub queue: Arc<BoundedQueue<WorkItem>>,
    pub drops: Arc<DropCounter>,
    pub queue_wait: Arc<QueueWaitStats>,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub sink: Arc<dyn StatsSink>,
}

impl RunContext {
    /// Allocate the queue and shared buffers. Fails if the queue cannot be allocated.
    ///
    /// `expected_items` pre-sizes the queue-wait buffer.
    pub fn new(capacity: usize, expected_items: usize, sink: Arc<dyn StatsSink>) -> Result<Self> {
        Ok(Self {
            queue: Arc::new(BoundedQueue::new(capacity)?),
            drops: Arc::new(DropCounter::new()),
            queue_wait: Arc::new(QueueWaitStats::with_capacity(expected_items)),
            coordinator: Arc::new(ShutdownCoordinator::new()),
            sink,
        })
    }
}
