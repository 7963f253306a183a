//! Drift-compensated periodic timers.
//!
//! Each timer owns one OS thread and walks `Created -> DelayedStart -> Running -> Stopped`. It
//! always runs exactly its configured number of ticks; there is no cancellation.
//!
//! Drift compensation: the timer keeps a signed cumulative lag. Every tick after the first adds
//! `(actual time since the previous tick started) - period` to it. Before the next tick the timer
//! sleeps `period - lag`, or not at all when that is negative (more than one period behind). Ticks
//! are never skipped; only the sleep is.

use crate::config::TimerConfig;
use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use crate::hooks::{TimerHooks, TimerInfo};
use crate::producer::ProducerLoop;
use crate::stats::{micros, signed_micros, TimerStats};
use crate::threading::{spawn_named, ThreadRole};
use crate::work::WorkloadGenerator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info};

/// Lifecycle of a timer thread, observable through [`TimerHandle::state`] while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Created,
    DelayedStart,
    Running,
    Stopped,
}

/// Cumulative scheduling lag of one timer, in microseconds.
#[derive(Debug, Clone)]
pub struct DriftTracker {
    period_us: i64,
    lag_us: i64,
    previous_start: Option<Instant>,
}

impl DriftTracker {
    pub fn new(period: Duration) -> Self {
        Self {
            period_us: micros(period),
            lag_us: 0,
            previous_start: None,
        }
    }

    /// Feed the start instant of the current tick. Returns the time since the previous tick
    /// started (0 for the first tick) and folds its deviation from the period into the lag.
    pub fn observe_tick_start(&mut self, started: Instant) -> i64 {
        let inter_arrival = match self.previous_start {
            Some(previous) => {
                let between = signed_micros(started, previous);
                self.lag_us += between - self.period_us;
                between
            }
            None => 0,
        };
        self.previous_start = Some(started);
        inter_arrival
    }

    pub fn lag_us(&self) -> i64 {
        self.lag_us
    }

    /// Sleep before the next tick, or `None` when the timer is more than one period behind.
    ///
    /// A negative lag (the previous sleep overshot its correction) lengthens the sleep.
    pub fn next_sleep(&self) -> Option<Duration> {
        let remaining = self.period_us - self.lag_us;
        if remaining < 0 {
            None
        } else {
            Some(Duration::from_micros(remaining as u64))
        }
    }
}

/// Counters and series produced by a finished timer.
#[derive(Debug, Clone)]
pub struct TimerReport {
    pub stats: TimerStats,
    pub accepted: u64,
    pub rejected: u64,
}

/// One periodic producer, fully configured but not yet running.
pub struct PeriodicTimer {
    info: TimerInfo,
    config: TimerConfig,
    context: RunContext,
    hooks: Arc<dyn TimerHooks>,
    generator: Box<dyn WorkloadGenerator>,
    state: Arc<Mutex<TimerState>>,
}

impl PeriodicTimer {
    pub fn new(
        index: usize,
        config: TimerConfig,
        context: RunContext,
        hooks: Arc<dyn TimerHooks>,
        generator: Box<dyn WorkloadGenerator>,
    ) -> Self {
        Self {
            info: TimerInfo {
                index,
                period: config.period,
            },
            config,
            context,
            hooks,
            generator,
            state: Arc::new(Mutex::new(TimerState::Created)),
        }
    }

    pub fn state(&self) -> TimerState {
        *self.state.lock()
    }

    pub fn info(&self) -> TimerInfo {
        self.info
    }

    /// Thread name, e.g. `timer-0-10ms`.
    pub fn thread_name(&self) -> String {
        format!("timer-{}-{}ms", self.info.index, self.info.period.as_millis())
    }

    /// Move the timer onto its own thread.
    pub fn start(self) -> Result<TimerHandle> {
        let name = self.thread_name();
        let state = self.state.clone();
        let join = spawn_named(name.clone(), ThreadRole::Timer, move || self.run())?;
        Ok(TimerHandle { name, state, join })
    }

    /// Run the whole timer lifecycle on the calling thread.
    ///
    /// Completion is always reported to the coordinator, even when flushing statistics fails,
    /// so the owner's shutdown wait cannot hang on a sink error.
    pub fn run(mut self) -> Result<TimerReport> {
        let delay = self.config.start_delay.resolve(SystemTime::now());
        if !delay.is_zero() {
            self.transition(TimerState::DelayedStart);
            thread::sleep(delay);
        }

        self.hooks.on_start(&self.info);
        self.transition(TimerState::Running);

        let iterations = self.config.iterations;
        let mut stats = TimerStats::new(self.info.index, self.info.period, iterations);
        let (accepted, rejected) = {
            let context = &self.context;
            let mut producer = ProducerLoop::new(
                self.info,
                &context.queue,
                &context.drops,
                self.hooks.as_ref(),
                self.generator.as_mut(),
            );
            for tick in 0..iterations {
                let outcome = producer.tick(tick, &mut stats);
                if tick + 1 == iterations {
                    break;
                }
                if let Some(sleep) = outcome.sleep {
                    thread::sleep(sleep);
                }
            }
            (producer.accepted(), producer.rejected())
        };

        self.hooks.on_stop(&self.info);
        self.transition(TimerState::Stopped);

        let flushed = stats.flush_to(self.context.sink.as_ref());
        if let Err(err) = &flushed {
            error!(timer = self.info.index, error = %err, "failed to flush timer statistics");
        }
        let finished = self.context.coordinator.producer_finished();
        info!(
            timer = self.info.index,
            period = ?self.info.period,
            accepted,
            rejected,
            finished_producers = finished,
            "timer finished"
        );

        flushed?;
        Ok(TimerReport {
            stats,
            accepted,
            rejected,
        })
    }

    fn transition(&self, next: TimerState) {
        let mut state = self.state.lock();
        debug!(timer = self.info.index, from = ?*state, to = ?next, "timer state");
        *state = next;
    }
}

/// Join handle for a started timer.
pub struct TimerHandle {
    name: String,
    state: Arc<Mutex<TimerState>>,
    join: JoinHandle<Result<TimerReport>>,
}

impl TimerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state of the timer thread.
    pub fn state(&self) -> TimerState {
        *self.state.lock()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<TimerReport> {
        self.join
            .join()
            .map_err(|_| HarnessError::ThreadPanicked(self.name))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(base: Instant, micros: u64) -> Instant {
        base + Duration::from_micros(micros)
    }

    #[test]
    fn first_tick_leaves_lag_untouched() {
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        assert_eq!(drift.observe_tick_start(Instant::now()), 0);
        assert_eq!(drift.lag_us(), 0);
        assert_eq!(drift.next_sleep(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn late_tick_shortens_next_sleep() {
        let base = Instant::now();
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        drift.observe_tick_start(base);
        assert_eq!(drift.observe_tick_start(at(base, 10_300)), 10_300);
        assert_eq!(drift.lag_us(), 300);
        assert_eq!(drift.next_sleep(), Some(Duration::from_micros(9_700)));
    }

    #[test]
    fn early_tick_lengthens_next_sleep() {
        let base = Instant::now();
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        drift.observe_tick_start(base);
        drift.observe_tick_start(at(base, 9_800));
        assert_eq!(drift.lag_us(), -200);
        assert_eq!(drift.next_sleep(), Some(Duration::from_micros(10_200)));
    }

    #[test]
    fn more_than_a_period_behind_skips_sleep() {
        let base = Instant::now();
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        drift.observe_tick_start(base);
        drift.observe_tick_start(at(base, 25_000));
        assert_eq!(drift.lag_us(), 15_000);
        assert_eq!(drift.next_sleep(), None);
    }

    #[test]
    fn lag_accumulates_and_recovers() {
        let base = Instant::now();
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        drift.observe_tick_start(base);
        // 11 ms, 11 ms, then a compensated 8 ms gap
        drift.observe_tick_start(at(base, 11_000));
        drift.observe_tick_start(at(base, 22_000));
        assert_eq!(drift.lag_us(), 2_000);
        assert_eq!(drift.next_sleep(), Some(Duration::from_millis(8)));
        drift.observe_tick_start(at(base, 30_000));
        assert_eq!(drift.lag_us(), 0);
    }

    #[test]
    fn persistent_overrun_grows_lag_without_bound() {
        let base = Instant::now();
        let mut drift = DriftTracker::new(Duration::from_millis(10));
        let mut now = 0;
        drift.observe_tick_start(at(base, now));
        for _ in 0..50 {
            now += 12_000;
            drift.observe_tick_start(at(base, now));
        }
        assert_eq!(drift.lag_us(), 50 * 2_000);
        assert_eq!(drift.next_sleep(), None);
    }
}
