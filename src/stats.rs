//! Statistics buffers and the sink they are flushed to.
//!
//! Every sample is an integer number of microseconds. Timer-local series are written only by
//! their own timer thread and need no lock; the queue-wait series and the drop counter are shared
//! and each sit behind a dedicated mutex, distinct from the queue lock.

use crate::error::{HarnessError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Name of the shared queue-wait series.
pub const QUEUE_WAIT_SERIES: &str = "timeInQueue.csv";
/// Name of the drop counter scalar.
pub const DROP_COUNTER_SERIES: &str = "queueFullCounter.txt";

/// Duration in whole microseconds, saturating at `i64::MAX`.
#[inline]
pub fn micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Signed microseconds from `earlier` to `later`; negative when `later` precedes `earlier`.
#[inline]
pub fn signed_micros(later: Instant, earlier: Instant) -> i64 {
    if later >= earlier {
        micros(later - earlier)
    } else {
        -micros(earlier - later)
    }
}

/// Per-timer series, one slot per configured iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerStats {
    pub index: usize,
    pub period: Duration,
    /// Cumulative lag after each tick (signed).
    pub lag_us: Vec<i64>,
    /// Time since the previous tick started; 0 for the first tick.
    pub inter_arrival_us: Vec<i64>,
    /// Producer-side processing time of each tick.
    pub producer_us: Vec<i64>,
}

impl TimerStats {
    pub fn new(index: usize, period: Duration, iterations: usize) -> Self {
        Self {
            index,
            period,
            lag_us: vec![0; iterations],
            inter_arrival_us: vec![0; iterations],
            producer_us: vec![0; iterations],
        }
    }

    pub fn iterations(&self) -> usize {
        self.lag_us.len()
    }

    #[inline]
    pub fn record(&mut self, tick: usize, lag_us: i64, inter_arrival_us: i64, producer_us: i64) {
        self.lag_us[tick] = lag_us;
        self.inter_arrival_us[tick] = inter_arrival_us;
        self.producer_us[tick] = producer_us;
    }

    /// Series names used when flushing, keyed by the period in milliseconds.
    pub fn series_names(&self) -> [String; 3] {
        let period_ms = self.period.as_millis();
        [
            format!("queueLagStats-timer{period_ms}.csv"),
            format!("timeBetweenStats-timer{period_ms}.csv"),
            format!("producerTimeStats-timer{period_ms}.csv"),
        ]
    }

    /// Write the three series as single-row tables.
    pub fn flush_to(&self, sink: &dyn StatsSink) -> Result<()> {
        let [lag, between, producer] = self.series_names();
        let columns = self.iterations();
        sink.write_series(&lag, &self.lag_us, 1, columns)?;
        sink.write_series(&between, &self.inter_arrival_us, 1, columns)?;
        sink.write_series(&producer, &self.producer_us, 1, columns)?;
        Ok(())
    }
}

/// Queue-wait samples appended by every consumer.
#[derive(Debug, Default)]
pub struct QueueWaitStats {
    samples: Mutex<Vec<i64>>,
}

impl QueueWaitStats {
    /// Pre-size for the expected number of accepted items so appends never reallocate on the
    /// consumer hot path in the common case.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    #[inline]
    pub fn record(&self, wait: Duration) {
        self.samples.lock().push(micros(wait));
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<i64> {
        self.samples.lock().clone()
    }

    pub fn into_inner(self) -> Vec<i64> {
        self.samples.into_inner()
    }
}

/// Items rejected because the queue was full.
#[derive(Debug, Default)]
pub struct DropCounter {
    count: Mutex<u64>,
}

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment(&self) {
        *self.count.lock() += 1;
    }

    pub fn get(&self) -> u64 {
        *self.count.lock()
    }
}

/// Order statistics for a sample series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub p50: i64,
    pub p99: i64,
}

impl Summary {
    /// Summarize `samples`; `None` for an empty series.
    ///
    /// Percentiles use the nearest-rank method on a sorted copy.
    pub fn from_samples(samples: &[i64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let len = sorted.len();
        let rank = |pct: f64| ((len as f64 * pct / 100.0).ceil() as usize).clamp(1, len) - 1;
        let sum: i128 = sorted.iter().map(|&v| v as i128).sum();
        Some(Self {
            count: len,
            min: sorted[0],
            max: sorted[len - 1],
            mean: sum as f64 / len as f64,
            p50: sorted[rank(50.0)],
            p99: sorted[rank(99.0)],
        })
    }
}

/// Destination for named numeric series.
///
/// `values` is row-major with `rows * columns` entries.
pub trait StatsSink: Send + Sync {
    fn write_series(&self, name: &str, values: &[i64], rows: usize, columns: usize) -> Result<()>;

    fn write_scalar(&self, name: &str, value: i64) -> Result<()> {
        self.write_series(name, &[value], 1, 1)
    }
}

/// Appends series to comma-delimited files under a directory.
///
/// Each value is followed by a comma, each row ends with a newline, and every block ends with an
/// extra blank line, so repeated runs accumulate in the same file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    /// Create the sink, creating `dir` if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StatsSink for CsvSink {
    fn write_series(&self, name: &str, values: &[i64], rows: usize, columns: usize) -> Result<()> {
        if values.len() != rows * columns {
            return Err(HarnessError::InvalidConfig(format!(
                "series `{name}` has {} values, shape is {rows}x{columns}",
                values.len()
            )));
        }
        let sink_err = |source| HarnessError::Sink {
            series: name.to_string(),
            source,
        };

        let path = self.path_for(name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(sink_err)?;
        let mut out = BufWriter::new(file);
        for row in 0..rows {
            for value in &values[row * columns..(row + 1) * columns] {
                write!(out, "{value},").map_err(sink_err)?;
            }
            writeln!(out).map_err(sink_err)?;
        }
        writeln!(out).map_err(sink_err)?;
        out.flush().map_err(sink_err)?;

        info!(path = %path.display(), rows, columns, "statistics file written");
        Ok(())
    }
}

/// In-memory sink, mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct MemorySink {
    series: Mutex<HashMap<String, Vec<Vec<i64>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every block written under `name`, in write order.
    pub fn blocks(&self, name: &str) -> Vec<Vec<i64>> {
        self.series.lock().get(name).cloned().unwrap_or_default()
    }

    /// The most recent block written under `name`.
    pub fn latest(&self, name: &str) -> Option<Vec<i64>> {
        self.series
            .lock()
            .get(name)
            .and_then(|blocks| blocks.last().cloned())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.series.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl StatsSink for MemorySink {
    fn write_series(&self, name: &str, values: &[i64], rows: usize, columns: usize) -> Result<()> {
        debug_assert_eq!(values.len(), rows * columns);
        self.series
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(values.to_vec());
        Ok(())
    }
}
