//! Error taxonomy for harness setup, statistics output, and shutdown.
//!
//! Queue-full rejection is deliberately absent: it is the designed backpressure path and is
//! reported through [`crate::queue::Enqueue::Rejected`] plus the drop counter, never as an error.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures that escape to the owning process.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Configuration rejected before any thread starts (capacity 0, no workers, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The ring buffer backing the queue could not be allocated.
    #[error("failed to allocate queue with capacity {capacity}")]
    Allocation { capacity: usize },

    /// The OS refused to create a timer or worker thread.
    #[error("failed to spawn thread `{name}`: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The statistics sink could not persist a series.
    #[error("failed to write statistics series `{series}`: {source}")]
    Sink {
        series: String,
        #[source]
        source: io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A joined thread terminated by panicking.
    #[error("thread `{0}` panicked")]
    ThreadPanicked(String),

    /// The shutdown wait gave up before every participant reported completion.
    #[error("shutdown timed out after {waited:?}: {finished}/{expected} {role} finished")]
    ShutdownTimeout {
        role: &'static str,
        finished: usize,
        expected: usize,
        waited: Duration,
    },
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_error_names_the_thread() {
        let err = HarnessError::Spawn {
            name: "timer-10ms".to_string(),
            source: io::Error::new(io::ErrorKind::WouldBlock, "EAGAIN"),
        };
        let message = err.to_string();
        assert!(message.contains("timer-10ms"));
        assert!(message.contains("EAGAIN"));
    }

    #[test]
    fn shutdown_timeout_reports_progress() {
        let err = HarnessError::ShutdownTimeout {
            role: "consumers",
            finished: 1,
            expected: 3,
            waited: Duration::from_secs(2),
        };
        assert_eq!(
            err.to_string(),
            "shutdown timed out after 2s: 1/3 consumers finished"
        );
    }
}
