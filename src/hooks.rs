//! Lifecycle callbacks injected into each periodic timer.
//!
//! A timer calls [`TimerHooks::on_start`] once before its first tick, [`TimerHooks::on_stop`] once
//! after its last tick, and [`TimerHooks::on_overflow`] once per rejected insert. Hooks run on the
//! timer thread, so they must stay cheap: anything slow here shows up as scheduling lag.

use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::{info, warn};

/// Identity of the timer invoking a hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerInfo {
    /// Position of the timer in the harness configuration.
    pub index: usize,
    pub period: Duration,
}

/// Callbacks observed by a running timer.
pub trait TimerHooks: Send + Sync {
    fn on_start(&self, _timer: &TimerInfo) {}

    fn on_stop(&self, _timer: &TimerInfo) {}

    /// `tick` is the zero-based iteration whose item was rejected.
    fn on_overflow(&self, _timer: &TimerInfo, _tick: usize) {}
}

/// Hooks that report through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHooks;

impl TimerHooks for LoggingHooks {
    fn on_start(&self, timer: &TimerInfo) {
        info!(timer = timer.index, period = ?timer.period, "timer started");
    }

    fn on_stop(&self, timer: &TimerInfo) {
        info!(timer = timer.index, period = ?timer.period, "timer ended");
    }

    fn on_overflow(&self, timer: &TimerInfo, tick: usize) {
        warn!(timer = timer.index, tick, "queue full, work item dropped");
    }
}

/// Hooks that never do anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl TimerHooks for NoopHooks {}

type Callback = Box<dyn Fn(&TimerInfo) + Send + Sync>;
type OverflowCallback = Box<dyn Fn(&TimerInfo, usize) + Send + Sync>;

/// Closure-backed hooks; unset callbacks are no-ops.
///
/// ```
/// use timer_queue_bench::hooks::FnHooks;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let drops = Arc::new(AtomicUsize::new(0));
/// let counter = drops.clone();
/// let hooks = FnHooks::new().on_overflow(move |_, _| {
///     counter.fetch_add(1, Ordering::Relaxed);
/// });
/// # let _ = hooks;
/// ```
#[derive(Default)]
pub struct FnHooks {
    start: Option<Callback>,
    stop: Option<Callback>,
    overflow: Option<OverflowCallback>,
}

impl FnHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_start(mut self, f: impl Fn(&TimerInfo) + Send + Sync + 'static) -> Self {
        self.start = Some(Box::new(f));
        self
    }

    pub fn on_stop(mut self, f: impl Fn(&TimerInfo) + Send + Sync + 'static) -> Self {
        self.stop = Some(Box::new(f));
        self
    }

    pub fn on_overflow(mut self, f: impl Fn(&TimerInfo, usize) + Send + Sync + 'static) -> Self {
        self.overflow = Some(Box::new(f));
        self
    }
}

impl TimerHooks for FnHooks {
    fn on_start(&self, timer: &TimerInfo) {
        if let Some(f) = &self.start {
            f(timer);
        }
    }

    fn on_stop(&self, timer: &TimerInfo) {
        if let Some(f) = &self.stop {
            f(timer);
        }
    }

    fn on_overflow(&self, timer: &TimerInfo, tick: usize) {
        if let Some(f) = &self.overflow {
            f(timer, tick);
        }
    }
}

/// Lifecycle notification forwarded by [`ChannelHooks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started(TimerInfo),
    Stopped(TimerInfo),
    Overflow { timer: TimerInfo, tick: usize },
}

/// Hooks that forward every notification over a channel.
///
/// Sending never blocks the timer: events are dropped once the receiver is gone or a bounded
/// channel is full.
#[derive(Debug, Clone)]
pub struct ChannelHooks {
    events: Sender<TimerEvent>,
}

impl ChannelHooks {
    pub fn new(events: Sender<TimerEvent>) -> Self {
        Self { events }
    }
}

impl TimerHooks for ChannelHooks {
    fn on_start(&self, timer: &TimerInfo) {
        let _ = self.events.try_send(TimerEvent::Started(*timer));
    }

    fn on_stop(&self, timer: &TimerInfo) {
        let _ = self.events.try_send(TimerEvent::Stopped(*timer));
    }

    fn on_overflow(&self, timer: &TimerInfo, tick: usize) {
        let _ = self.events.try_send(TimerEvent::Overflow {
            timer: *timer,
            tick,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn info() -> TimerInfo {
        TimerInfo {
            index: 2,
            period: Duration::from_millis(10),
        }
    }

    #[test]
    fn fn_hooks_invoke_registered_closures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (a, b) = (calls.clone(), calls.clone());
        let hooks = FnHooks::new()
            .on_start(move |_| {
                a.fetch_add(1, Ordering::Relaxed);
            })
            .on_overflow(move |_, tick| {
                b.fetch_add(tick, Ordering::Relaxed);
            });

        TimerHooks::on_start(&hooks, &info());
        TimerHooks::on_stop(&hooks, &info());
        TimerHooks::on_overflow(&hooks, &info(), 10);
        assert_eq!(calls.load(Ordering::Relaxed), 11);
    }

    #[test]
    fn channel_hooks_forward_events_in_order() {
        let (tx, rx) = unbounded();
        let hooks = ChannelHooks::new(tx);
        hooks.on_start(&info());
        hooks.on_overflow(&info(), 3);
        hooks.on_stop(&info());

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                TimerEvent::Started(info()),
                TimerEvent::Overflow {
                    timer: info(),
                    tick: 3
                },
                TimerEvent::Stopped(info()),
            ]
        );
    }

    #[test]
    fn channel_hooks_survive_dropped_receiver() {
        let (tx, rx) = unbounded();
        drop(rx);
        ChannelHooks::new(tx).on_start(&info());
    }
}
