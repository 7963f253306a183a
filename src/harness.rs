//! Run orchestration.
//!
//! The harness builds the shared context, starts the consumer pool and one thread per timer, and
//! then drives the shutdown handshake:
//!
//! 1. wait until every timer has reported completion,
//! 2. mark production ended on the queue (one broadcast wakes every parked consumer),
//! 3. wait until every consumer has observed end-of-stream,
//! 4. join all threads, flush the shared statistics, and hand the collected data back.
//!
//! Known limitation: a timer or consumer thread that dies mid-run never reports completion.
//! Without `shutdown_timeout` the corresponding wait blocks forever. With it, a producer timeout
//! still ends production so the consumers drain and exit, and the unfinished timers are detached;
//! a consumer timeout detaches the pool after joining the timers.

use crate::config::HarnessConfig;
use crate::consumer::ConsumerPool;
use crate::context::RunContext;
use crate::error::Result;
use crate::hooks::{LoggingHooks, TimerHooks};
use crate::stats::{CsvSink, StatsSink, Summary, DROP_COUNTER_SERIES, QUEUE_WAIT_SERIES};
use crate::timer::{PeriodicTimer, TimerHandle, TimerReport};
use crate::work::{RandomWorkload, WorkloadGenerator};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Builds one workload generator per timer, given the timer's index.
pub type WorkloadFactory = Box<dyn Fn(usize) -> Box<dyn WorkloadGenerator> + Send + Sync>;

fn random_workload(args_per_item: usize) -> WorkloadFactory {
    Box::new(move |_: usize| -> Box<dyn WorkloadGenerator> {
        Box::new(RandomWorkload::new(args_per_item))
    })
}

/// Everything collected during one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub timers: Vec<TimerReport>,
    /// Items executed by the consumer pool.
    pub consumed: u64,
    /// Items rejected because the queue was full.
    pub dropped: u64,
    /// Sum of every executed item's result.
    pub accumulator: f64,
    /// Queue-wait samples in microseconds, in append order.
    pub queue_wait: Vec<i64>,
}

impl RunReport {
    pub fn accepted(&self) -> u64 {
        self.timers.iter().map(|t| t.accepted).sum()
    }

    pub fn rejected(&self) -> u64 {
        self.timers.iter().map(|t| t.rejected).sum()
    }

    pub fn attempts(&self) -> u64 {
        self.accepted() + self.rejected()
    }

    pub fn queue_wait_summary(&self) -> Option<Summary> {
        Summary::from_samples(&self.queue_wait)
    }
}

/// Configured harness, ready to run.
pub struct Harness {
    config: HarnessConfig,
    sink: Arc<dyn StatsSink>,
    hooks: Arc<dyn TimerHooks>,
    workload: WorkloadFactory,
}

impl Harness {
    /// Validate `config` and write statistics as CSV under `config.output_dir`.
    pub fn new(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let sink: Arc<dyn StatsSink> = Arc::new(CsvSink::new(&config.output_dir)?);
        Self::with_sink(config, sink)
    }

    /// Validate `config` and write statistics to `sink`.
    pub fn with_sink(config: HarnessConfig, sink: Arc<dyn StatsSink>) -> Result<Self> {
        config.validate()?;
        let args_per_item = config.args_per_item;
        Ok(Self {
            config,
            sink,
            hooks: Arc::new(LoggingHooks),
            workload: random_workload(args_per_item),
        })
    }

    /// Lifecycle hooks shared by every timer.
    pub fn hooks(mut self, hooks: Arc<dyn TimerHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn workload(mut self, factory: WorkloadFactory) -> Self {
        self.workload = factory;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Shared state for one run of this harness: a fresh queue sized from the config and the
    /// harness's sink.
    ///
    /// [`Harness::run`] builds one internally; build it here instead to keep a handle on the
    /// queue and coordinator across [`Harness::run_with`].
    pub fn context(&self) -> Result<RunContext> {
        RunContext::new(
            self.config.queue_capacity,
            self.config.total_iterations(),
            self.sink.clone(),
        )
    }

    /// Run every timer to completion, drain the queue, and return the collected statistics.
    ///
    /// # Returns
    /// A [`RunReport`] once every timer has finished, the queue has been drained, every thread
    /// has been joined and the queue-wait and drop series have been written to the sink.
    ///
    /// # Errors
    /// * `Allocation` if the queue cannot be allocated.
    /// * `Spawn` if a consumer or timer thread cannot be created. Threads already started are
    ///   joined first.
    /// * `ShutdownTimeout` if `shutdown_timeout` is set and a shutdown wait expires. After a
    ///   producer timeout the consumers have still been released and joined; unfinished timers
    ///   keep running detached.
    /// * `ThreadPanicked` if a timer or consumer panicked.
    /// * `Sink` if a timer or the final flush cannot write its statistics.
    pub fn run(self) -> Result<RunReport> {
        let context = self.context()?;
        self.run_with(context)
    }

    /// Like [`Harness::run`], on a context the caller built with [`Harness::context`].
    pub fn run_with(self, context: RunContext) -> Result<RunReport> {
        let config = &self.config;
        let started = Instant::now();

        info!(
            workers = config.workers,
            capacity = config.queue_capacity,
            timers = config.timers.len(),
            estimated = ?config.estimated_runtime(),
            "starting run"
        );

        let pool = ConsumerPool::start(config.workers, &context)?;

        let mut timers: Vec<TimerHandle> = Vec::with_capacity(config.timers.len());
        for (index, timer_config) in config.timers.iter().enumerate() {
            let timer = PeriodicTimer::new(
                index,
                timer_config.clone(),
                context.clone(),
                self.hooks.clone(),
                (self.workload)(index),
            );
            match timer.start() {
                Ok(handle) => timers.push(handle),
                Err(err) => {
                    warn!(timer = index, error = %err, "aborting startup");
                    // Started timers cannot be cancelled; let them finish before draining.
                    for handle in timers {
                        let _ = handle.join();
                    }
                    context.queue.mark_production_ended();
                    let _ = pool.join();
                    return Err(err);
                }
            }
        }

        let timeout = config.shutdown_timeout;
        if let Err(err) = context
            .coordinator
            .wait_for_producers(timers.len(), timeout)
        {
            let detached = timers.iter().filter(|t| !t.is_finished()).count();
            warn!(error = %err, detached, "timers still running, detaching them");
            // Consumers must not stay parked on a queue nobody will close.
            context.queue.mark_production_ended();
            match context
                .coordinator
                .wait_for_consumers(config.workers, timeout)
            {
                Ok(()) => {
                    let _ = pool.join();
                }
                Err(consumers) => warn!(error = %consumers, "detaching consumer pool"),
            }
            return Err(err);
        }
        context.queue.mark_production_ended();
        info!("production ended, draining queue");
        if let Err(err) = context
            .coordinator
            .wait_for_consumers(config.workers, timeout)
        {
            warn!(error = %err, "consumers still running, detaching pool");
            for handle in timers {
                let _ = handle.join();
            }
            return Err(err);
        }

        let mut reports = Vec::with_capacity(timers.len());
        for handle in timers {
            reports.push(handle.join()?);
        }
        let pool_report = pool.join()?;

        let queue_wait = context.queue_wait.snapshot();
        let dropped = context.drops.get();
        context
            .sink
            .write_series(QUEUE_WAIT_SERIES, &queue_wait, 1, queue_wait.len())?;
        context
            .sink
            .write_scalar(DROP_COUNTER_SERIES, dropped as i64)?;

        let report = RunReport {
            timers: reports,
            consumed: pool_report.consumed(),
            dropped,
            accumulator: pool_report.accumulator(),
            queue_wait,
        };
        info!(
            elapsed = ?started.elapsed(),
            accepted = report.accepted(),
            dropped = report.dropped,
            consumed = report.consumed,
            accumulator = report.accumulator,
            "run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimerConfig;
    use crate::stats::MemorySink;
    use std::time::Duration;

    #[test]
    fn rejects_invalid_config() {
        let config = HarnessConfig {
            workers: 0,
            ..HarnessConfig::default()
        };
        assert!(Harness::with_sink(config, Arc::new(MemorySink::new())).is_err());
    }

    #[test]
    fn small_run_conserves_items() {
        let config = HarnessConfig {
            workers: 2,
            queue_capacity: 4,
            timers: vec![
                TimerConfig::new(Duration::from_millis(2), 20),
                TimerConfig::new(Duration::from_millis(3), 10),
            ],
            shutdown_timeout: Some(Duration::from_secs(10)),
            ..HarnessConfig::default()
        };
        let sink = Arc::new(MemorySink::new());
        let report = Harness::with_sink(config, sink.clone())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(report.attempts(), 30);
        assert_eq!(report.accepted() + report.dropped, 30);
        assert_eq!(report.consumed, report.accepted());
        assert_eq!(report.queue_wait.len() as u64, report.consumed);
        assert_eq!(
            sink.latest(DROP_COUNTER_SERIES),
            Some(vec![report.dropped as i64])
        );
        assert_eq!(
            sink.latest(QUEUE_WAIT_SERIES).map(|s| s.len() as u64),
            Some(report.consumed)
        );
    }
}
