//! Completion tracking for the end-of-run handshake.
//!
//! Timers and consumers each bump their own counter when they finish. The owner waits for every
//! timer, flips the queue's production-ended flag (which wakes parked consumers once), then waits
//! for every consumer before joining threads. Each counter pairs a mutex with a condvar, so the
//! owner sleeps instead of polling.
//!
//! A thread that dies before reporting never bumps its counter. Without a timeout the wait would
//! then block forever; with one it surfaces [`HarnessError::ShutdownTimeout`].

use crate::error::{HarnessError, Result};
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Monotonic counter that can be waited on until it reaches a target.
#[derive(Debug, Default)]
struct CompletionCounter {
    count: Mutex<usize>,
    changed: Condvar,
}

impl CompletionCounter {
    fn increment(&self) -> usize {
        let value = {
            let mut count = self.count.lock();
            *count += 1;
            *count
        };
        self.changed.notify_all();
        value
    }

    fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Block until the count reaches `target`. Returns the final count, or `Err(count)` on timeout.
    fn wait_for(&self, target: usize, timeout: Option<Duration>) -> std::result::Result<usize, usize> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut count = self.count.lock();
        while *count < target {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut count, deadline).timed_out() && *count < target
                    {
                        return Err(*count);
                    }
                }
                None => self.changed.wait(&mut count),
            }
        }
        Ok(*count)
    }
}

/// Counters for finished producers (timers) and finished consumers.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    producers: CompletionCounter,
    consumers: CompletionCounter,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once by each timer thread after its statistics are flushed.
    pub fn producer_finished(&self) -> usize {
        self.producers.increment()
    }

    /// Called once by each consumer after it observes end-of-stream.
    pub fn consumer_finished(&self) -> usize {
        self.consumers.increment()
    }

    pub fn finished_producers(&self) -> usize {
        self.producers.get()
    }

    pub fn finished_consumers(&self) -> usize {
        self.consumers.get()
    }

    pub fn wait_for_producers(&self, expected: usize, timeout: Option<Duration>) -> Result<()> {
        self.producers
            .wait_for(expected, timeout)
            .map(|_| ())
            .map_err(|finished| HarnessError::ShutdownTimeout {
                role: "producers",
                finished,
                expected,
                waited: timeout.unwrap_or_default(),
            })
    }

    pub fn wait_for_consumers(&self, expected: usize, timeout: Option<Duration>) -> Result<()> {
        self.consumers
            .wait_for(expected, timeout)
            .map(|_| ())
            .map_err(|finished| HarnessError::ShutdownTimeout {
                role: "consumers",
                finished,
                expected,
                waited: timeout.unwrap_or_default(),
            })
    }
}
