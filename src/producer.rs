//! Per-tick producer logic executed by each periodic timer.
//!
//! A tick builds one work item, tries to insert it without blocking, and records its own timing.
//! A full queue is the normal backpressure path: the item is discarded, the shared drop counter
//! is bumped, and the overflow hook fires. Nothing that happens in a tick escapes it.

use crate::hooks::{TimerHooks, TimerInfo};
use crate::queue::{BoundedQueue, Enqueue};
use crate::stats::{micros, DropCounter, TimerStats};
use crate::timer::DriftTracker;
use crate::work::{WorkItem, WorkloadGenerator};
use std::time::{Duration, Instant};
use tracing::trace;

/// What a single tick did and how long the timer should wait before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    pub accepted: bool,
    /// `None` when the timer is more than one period behind and must not sleep.
    pub sleep: Option<Duration>,
}

/// Producer state owned by one timer thread.
pub struct ProducerLoop<'a> {
    info: TimerInfo,
    queue: &'a BoundedQueue<WorkItem>,
    drops: &'a DropCounter,
    hooks: &'a dyn TimerHooks,
    generator: &'a mut dyn WorkloadGenerator,
    drift: DriftTracker,
    accepted: u64,
    rejected: u64,
}

impl<'a> ProducerLoop<'a> {
    pub fn new(
        info: TimerInfo,
        queue: &'a BoundedQueue<WorkItem>,
        drops: &'a DropCounter,
        hooks: &'a dyn TimerHooks,
        generator: &'a mut dyn WorkloadGenerator,
    ) -> Self {
        Self {
            info,
            queue,
            drops,
            hooks,
            generator,
            drift: DriftTracker::new(info.period),
            accepted: 0,
            rejected: 0,
        }
    }

    /// Run tick `index`, writing its samples into `stats`.
    pub fn tick(&mut self, index: usize, stats: &mut TimerStats) -> TickOutcome {
        let started = Instant::now();

        let (operation, args) = self.generator.next_work();
        let item = WorkItem::new(operation, args);

        let accepted = match self
            .queue
            .try_enqueue_with(item, WorkItem::stamp_enqueued)
        {
            Enqueue::Accepted => {
                self.accepted += 1;
                true
            }
            Enqueue::Rejected(_discarded) => {
                self.rejected += 1;
                self.drops.increment();
                self.hooks.on_overflow(&self.info, index);
                false
            }
        };

        let finished = Instant::now();

        let inter_arrival_us = self.drift.observe_tick_start(started);
        let producer_us = micros(finished.saturating_duration_since(started));
        stats.record(index, self.drift.lag_us(), inter_arrival_us, producer_us);

        let sleep = self.drift.next_sleep();
        trace!(
            timer = self.info.index,
            tick = index,
            accepted,
            lag_us = self.drift.lag_us(),
            "tick"
        );
        TickOutcome { accepted, sleep }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::FnHooks;
    use crate::work::{FixedWorkload, Operation};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn info() -> TimerInfo {
        TimerInfo {
            index: 0,
            period: Duration::from_millis(10),
        }
    }

    fn workload() -> FixedWorkload {
        FixedWorkload {
            operation: Operation::Sin,
            base_degrees: 0,
            args_per_item: 4,
        }
    }

    #[test]
    fn full_queue_drops_and_notifies() {
        let queue = BoundedQueue::new(1).unwrap();
        let drops = DropCounter::new();
        let overflows = Arc::new(AtomicUsize::new(0));
        let counter = overflows.clone();
        let hooks = FnHooks::new().on_overflow(move |_, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let mut generator = workload();
        let mut stats = TimerStats::new(0, info().period, 3);
        let mut producer = ProducerLoop::new(info(), &queue, &drops, &hooks, &mut generator);

        let outcomes: Vec<_> = (0..3).map(|i| producer.tick(i, &mut stats)).collect();

        assert!(outcomes[0].accepted);
        assert!(!outcomes[1].accepted);
        assert!(!outcomes[2].accepted);
        assert_eq!(producer.accepted(), 1);
        assert_eq!(producer.rejected(), 2);
        assert_eq!(drops.get(), 2);
        assert_eq!(overflows.load(Ordering::Relaxed), 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn accepted_item_is_stamped_at_insert() {
        let queue = BoundedQueue::new(2).unwrap();
        let drops = DropCounter::new();
        let hooks = FnHooks::new();
        let mut generator = workload();
        let mut stats = TimerStats::new(0, info().period, 1);
        let before = Instant::now();
        ProducerLoop::new(info(), &queue, &drops, &hooks, &mut generator).tick(0, &mut stats);
        let after = Instant::now();

        let item = queue.try_dequeue().unwrap();
        assert!(item.enqueued_at >= before && item.enqueued_at <= after);
        assert_eq!(item.args.len(), 4);
    }

    #[test]
    fn first_tick_records_zero_lag_and_full_sleep() {
        let queue = BoundedQueue::new(2).unwrap();
        let drops = DropCounter::new();
        let hooks = FnHooks::new();
        let mut generator = workload();
        let mut stats = TimerStats::new(0, info().period, 1);
        let outcome =
            ProducerLoop::new(info(), &queue, &drops, &hooks, &mut generator).tick(0, &mut stats);

        assert_eq!(stats.lag_us, vec![0]);
        assert_eq!(stats.inter_arrival_us, vec![0]);
        assert!(stats.producer_us[0] >= 0);
        assert_eq!(outcome.sleep, Some(Duration::from_millis(10)));
    }
}
