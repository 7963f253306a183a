//! Static harness configuration.
//!
//! Worker count, queue capacity, and the per-timer schedule are fixed when the harness is built;
//! nothing here is reconfigurable while a run is in progress. Defaults reproduce the reference
//! workload: three consumers, a three-slot queue, and one-hour timers at 1 s, 100 ms and 10 ms.

use crate::error::{HarnessError, Result};
use crate::work::DEFAULT_ARGS_PER_ITEM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// When a timer begins ticking relative to the harness start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartDelay {
    #[default]
    Immediate,
    /// Sleep this long (milliseconds in config files) before the first tick.
    After(#[serde(with = "duration_millis")] Duration),
    /// Start `offset` after a wall-clock instant.
    ///
    /// `instant` is seconds since the Unix epoch in config files and `offset` is milliseconds,
    /// defaulting to zero. The time remaining until `instant` is added to `offset`; an instant
    /// already in the past contributes nothing, so the timer waits `offset` alone.
    At {
        #[serde(with = "system_time_secs")]
        instant: SystemTime,
        #[serde(default, with = "duration_millis")]
        offset: Duration,
    },
}

impl StartDelay {
    /// Concrete sleep before the first tick, evaluated against `now`.
    pub fn resolve(&self, now: SystemTime) -> Duration {
        match *self {
            StartDelay::Immediate => Duration::ZERO,
            StartDelay::After(delay) => delay,
            StartDelay::At { instant, offset } => instant
                .duration_since(now)
                .unwrap_or(Duration::ZERO)
                .saturating_add(offset),
        }
    }
}

/// Schedule for one periodic producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Nominal tick period.
    #[serde(rename = "period_ms", with = "duration_millis")]
    pub period: Duration,
    /// Number of ticks to run. Zero still fires the start/stop hooks.
    pub iterations: usize,
    #[serde(default)]
    pub start_delay: StartDelay,
}

impl TimerConfig {
    pub fn new(period: Duration, iterations: usize) -> Self {
        Self {
            period,
            iterations,
            start_delay: StartDelay::Immediate,
        }
    }

    pub fn with_start_delay(mut self, start_delay: StartDelay) -> Self {
        self.start_delay = start_delay;
        self
    }

    /// Nominal time from harness start to the end of the last tick.
    pub fn nominal_runtime(&self, now: SystemTime) -> Duration {
        let ticks = u32::try_from(self.iterations).unwrap_or(u32::MAX);
        self.start_delay
            .resolve(now)
            .saturating_add(self.period.saturating_mul(ticks))
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Number of consumer threads.
    pub workers: usize,
    /// Maximum items held by the queue.
    pub queue_capacity: usize,
    /// Arguments carried by each work item.
    pub args_per_item: usize,
    pub timers: Vec<TimerConfig>,
    /// Directory the CSV sink writes into.
    pub output_dir: PathBuf,
    /// Upper bound on each shutdown wait; `None` waits forever.
    #[serde(with = "duration_millis_option")]
    pub shutdown_timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 3,
            args_per_item: DEFAULT_ARGS_PER_ITEM,
            timers: vec![
                TimerConfig::new(Duration::from_secs(1), 3_600),
                TimerConfig::new(Duration::from_millis(100), 36_000),
                TimerConfig::new(Duration::from_millis(10), 360_000),
            ],
            output_dir: PathBuf::from("."),
            shutdown_timeout: None,
        }
    }
}

impl HarnessConfig {
    /// Load a JSON configuration file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: HarnessConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot start.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(HarnessError::InvalidConfig(
                "at least one consumer worker is required".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(HarnessError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        if self.args_per_item == 0 {
            return Err(HarnessError::InvalidConfig(
                "work items need at least one argument".to_string(),
            ));
        }
        if let Some(idx) = self.timers.iter().position(|t| t.period.is_zero()) {
            return Err(HarnessError::InvalidConfig(format!(
                "timer {idx} has a zero period"
            )));
        }
        Ok(())
    }

    /// Total ticks across all timers; an upper bound on accepted items.
    pub fn total_iterations(&self) -> usize {
        self.timers.iter().map(|t| t.iterations).sum()
    }

    /// Longest nominal timer runtime, i.e. the earliest moment production can have ended.
    pub fn estimated_runtime(&self) -> Duration {
        let now = SystemTime::now();
        self.timers
            .iter()
            .map(|t| t.nominal_runtime(now))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Divide every timer's iteration count by `factor` (rounding down), for short runs.
    pub fn scaled(mut self, factor: usize) -> Self {
        if factor > 1 {
            for timer in &mut self.timers {
                timer.iterations /= factor;
            }
        }
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64() * 1_000.0)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(millis / 1_000.0).map_err(serde::de::Error::custom)
    }
}

mod duration_millis_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_secs_f64() * 1_000.0)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<f64> = Option::deserialize(deserializer)?;
        opt.map(|millis| Duration::try_from_secs_f64(millis / 1_000.0))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

mod system_time_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        serializer.serialize_u64(secs)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn default_matches_reference_workload() {
        let config = HarnessConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.total_iterations(), 3_600 + 36_000 + 360_000);
        assert_eq!(config.estimated_runtime(), Duration::from_secs(3_600));
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let mut config = HarnessConfig::default();
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = HarnessConfig::default();
        config.timers.push(TimerConfig::new(Duration::ZERO, 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_iteration_timers_are_valid() {
        let config = HarnessConfig {
            timers: vec![TimerConfig::new(Duration::from_millis(5), 0)],
            ..HarnessConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn start_at_in_past_resolves_to_zero() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let past = StartDelay::At {
            instant: UNIX_EPOCH + Duration::from_secs(10),
            offset: Duration::ZERO,
        };
        let future = StartDelay::At {
            instant: UNIX_EPOCH + Duration::from_secs(1_030),
            offset: Duration::ZERO,
        };
        assert_eq!(past.resolve(now), Duration::ZERO);
        assert_eq!(future.resolve(now), Duration::from_secs(30));
        assert_eq!(
            StartDelay::After(Duration::from_millis(250)).resolve(now),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn start_at_adds_offset_to_time_remaining() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let future = StartDelay::At {
            instant: UNIX_EPOCH + Duration::from_secs(1_030),
            offset: Duration::from_millis(500),
        };
        let past = StartDelay::At {
            instant: UNIX_EPOCH + Duration::from_secs(10),
            offset: Duration::from_millis(500),
        };
        assert_eq!(future.resolve(now), Duration::from_millis(30_500));
        assert_eq!(past.resolve(now), Duration::from_millis(500));
    }

    #[test]
    fn huge_schedule_saturates_estimated_runtime() {
        let config = HarnessConfig {
            timers: vec![TimerConfig::new(Duration::from_secs(1_000_000_000_000_000), 100_000)
                .with_start_delay(StartDelay::After(Duration::from_millis(1)))],
            ..HarnessConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.estimated_runtime(), Duration::MAX);
    }

    #[test]
    fn scaled_divides_iterations() {
        let config = HarnessConfig::default().scaled(1_000);
        let iterations: Vec<_> = config.timers.iter().map(|t| t.iterations).collect();
        assert_eq!(iterations, vec![3, 36, 360]);
    }

    #[test]
    fn json_round_trip_uses_millis() {
        let json = r#"{
            "workers": 2,
            "queue_capacity": 8,
            "timers": [
                { "period_ms": 10, "iterations": 5 },
                { "period_ms": 2.5, "iterations": 1, "start_delay": { "after": 100 } },
                { "period_ms": 1, "iterations": 1, "start_delay": { "at": { "instant": 60 } } }
            ],
            "shutdown_timeout": 5000
        }"#;
        let config: HarnessConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.args_per_item, DEFAULT_ARGS_PER_ITEM);
        assert_eq!(config.timers[0].period, Duration::from_millis(10));
        assert_eq!(config.timers[0].start_delay, StartDelay::Immediate);
        assert_eq!(config.timers[1].period, Duration::from_micros(2_500));
        assert_eq!(
            config.timers[1].start_delay,
            StartDelay::After(Duration::from_millis(100))
        );
        assert_eq!(
            config.timers[2].start_delay,
            StartDelay::At {
                instant: UNIX_EPOCH + Duration::from_secs(60),
                offset: Duration::ZERO,
            }
        );
        assert_eq!(config.shutdown_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn from_json_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "queue_capacity": 0 }"#).unwrap();
        assert!(matches!(
            HarnessConfig::from_json_file(&path),
            Err(HarnessError::InvalidConfig(_))
        ));
    }
}
