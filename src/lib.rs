pub mod config;
pub mod consumer;
pub mod context;
pub mod error;
pub mod harness;
pub mod hooks;
pub mod producer;
pub mod queue;
pub mod shutdown;
pub mod stats;
pub mod threading;
pub mod timer;
pub mod work;

// Re-export for easier testing
pub use config::{HarnessConfig, StartDelay, TimerConfig};
pub use error::{HarnessError, Result};
pub use harness::{Harness, RunReport};
pub use queue::{BoundedQueue, Enqueue};
pub use work::{Operation, WorkItem};
