//! Work items travelling from the periodic producers to the consumer pool.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Number of arguments carried by each item unless configured otherwise.
pub const DEFAULT_ARGS_PER_ITEM: usize = 10;

/// Degrees-to-radians factor used by the synthetic workload (kept at two decimals of pi).
#[allow(clippy::approx_constant)]
const DEG_TO_RAD: f64 = 3.14 / 180.0;

/// Fixed set of unary numeric operations a work item can select.
///
/// The ordering is stable so generators can pick a variant by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Sin,
    Cos,
    Tan,
    Acos,
    Asin,
    Atan,
}

impl Operation {
    /// Every operation, in selection order.
    pub const ALL: [Operation; 6] = [
        Operation::Sin,
        Operation::Cos,
        Operation::Tan,
        Operation::Acos,
        Operation::Asin,
        Operation::Atan,
    ];

    /// Stable index into [`Operation::ALL`].
    pub const fn index(self) -> usize {
        match self {
            Operation::Sin => 0,
            Operation::Cos => 1,
            Operation::Tan => 2,
            Operation::Acos => 3,
            Operation::Asin => 4,
            Operation::Atan => 5,
        }
    }

    /// Evaluate the operation for a single argument.
    ///
    /// `Acos`/`Asin` return NaN outside `[-1, 1]`, exactly like the libm functions they map to.
    #[inline]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Operation::Sin => x.sin(),
            Operation::Cos => x.cos(),
            Operation::Tan => x.tan(),
            Operation::Acos => x.acos(),
            Operation::Asin => x.asin(),
            Operation::Atan => x.atan(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Operation::Sin => "sin",
            Operation::Cos => "cos",
            Operation::Tan => "tan",
            Operation::Acos => "acos",
            Operation::Asin => "asin",
            Operation::Atan => "atan",
        };
        write!(f, "{label}")
    }
}

/// Ordered argument batch handed to an [`Operation`].
pub type ArgBatch = Vec<f64>;

/// One unit of synthetic work.
///
/// `enqueued_at` is overwritten by the queue at the moment of insertion, so queue-wait time never
/// includes the time spent generating the arguments.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub operation: Operation,
    pub args: ArgBatch,
    pub enqueued_at: Instant,
}

impl WorkItem {
    pub fn new(operation: Operation, args: ArgBatch) -> Self {
        Self {
            operation,
            args,
            enqueued_at: Instant::now(),
        }
    }

    /// Record the insertion instant. Called by the producer while it holds the queue lock.
    #[inline]
    pub fn stamp_enqueued(&mut self) {
        self.enqueued_at = Instant::now();
    }

    /// Run the selected operation over every argument and sum the results.
    pub fn execute(&self) -> f64 {
        self.args.iter().map(|&x| self.operation.apply(x)).sum()
    }
}

/// Source of the operation and arguments for each producer tick.
///
/// One generator instance lives on each timer thread, so implementations need `Send` but not
/// `Sync`.
pub trait WorkloadGenerator: Send {
    fn next_work(&mut self) -> (Operation, ArgBatch);
}

/// Default generator: random operation, batch of evenly spaced angles from a random base.
///
/// The base is drawn from `[0, 40)` degrees and argument `j` is `(base + 5j)` degrees expressed
/// in radians.
pub struct RandomWorkload<R = StdRng> {
    rng: R,
    args_per_item: usize,
}

impl RandomWorkload {
    pub fn new(args_per_item: usize) -> Self {
        // Seeded per generator: the thread-local rng cannot move onto a timer thread.
        Self::with_rng(StdRng::from_rng(&mut rand::rng()), args_per_item)
    }
}

impl<R: Rng> RandomWorkload<R> {
    pub fn with_rng(rng: R, args_per_item: usize) -> Self {
        Self { rng, args_per_item }
    }
}

impl<R: Rng + Send> WorkloadGenerator for RandomWorkload<R> {
    fn next_work(&mut self) -> (Operation, ArgBatch) {
        let operation = Operation::ALL[self.rng.random_range(0..Operation::ALL.len())];
        let base = self.rng.random_range(0..40u32);
        (operation, angle_batch(base, self.args_per_item))
    }
}

/// Deterministic generator that always yields the same operation and base angle.
#[derive(Debug, Clone)]
pub struct FixedWorkload {
    pub operation: Operation,
    pub base_degrees: u32,
    pub args_per_item: usize,
}

impl WorkloadGenerator for FixedWorkload {
    fn next_work(&mut self) -> (Operation, ArgBatch) {
        (
            self.operation,
            angle_batch(self.base_degrees, self.args_per_item),
        )
    }
}

/// `len` angles spaced 5 degrees apart starting at `base_degrees`, in radians.
pub fn angle_batch(base_degrees: u32, len: usize) -> ArgBatch {
    (0..len)
        .map(|j| (base_degrees as f64 + j as f64 * 5.0) * DEG_TO_RAD)
        .collect()
}
