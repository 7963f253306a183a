//! Fixed-capacity ring buffer shared by every producer and consumer.
//!
//! Producers never wait for space: a full queue rejects the insert and hands the item back so
//! the timer thread keeps its schedule. Consumers block until an item arrives or production has
//! ended. All ring state (indices, flags, slots) lives behind one mutex; the two condition
//! variables are always re-checked in a loop after waking.

use crate::error::{HarnessError, Result};
use parking_lot::{Condvar, Mutex};

/// Outcome of a non-blocking insert.
#[must_use = "a rejected item is handed back and must be counted or dropped explicitly"]
#[derive(Debug, PartialEq, Eq)]
pub enum Enqueue<T> {
    Accepted,
    /// The queue was full; the untouched item is returned.
    Rejected(T),
}

impl<T> Enqueue<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Enqueue::Accepted)
    }
}

/// Ring state guarded by the queue mutex.
///
/// `head == tail` is ambiguous on its own, so `full` and `empty` disambiguate it. At most one of
/// them is set at any instant.
struct Ring<T> {
    slots: Vec<Option<T>>,
    head: usize,
    tail: usize,
    full: bool,
    empty: bool,
    production_ended: bool,
}

impl<T> Ring<T> {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            (self.tail + self.capacity() - self.head) % self.capacity()
        }
    }

    fn push(&mut self, item: T) {
        debug_assert!(!self.full);
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
        self.full = self.tail == self.head;
        self.empty = false;
    }

    fn pop(&mut self) -> Option<T> {
        if self.empty {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.empty = self.head == self.tail;
        self.full = false;
        debug_assert!(item.is_some(), "occupied slot was vacant");
        item
    }
}

/// Bounded multi-producer / multi-consumer queue with drop-on-full inserts.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    /// Signalled once per successful insert.
    item_available: Condvar,
    /// Signalled once per successful removal. No producer waits on it: inserts never block.
    space_available: Condvar,
}

impl<T> BoundedQueue<T> {
    /// Allocate a queue holding at most `capacity` items.
    ///
    /// All slots are reserved up front; the queue never grows or reallocates afterwards, so
    /// inserts and removals under the lock are constant time.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of items held at once (must be at least 1)
    ///
    /// # Returns
    /// An empty queue with production still open, or:
    /// - `HarnessError::InvalidConfig` for a zero capacity
    /// - `HarnessError::Allocation` when the slot buffer cannot be reserved
    ///
    /// Both are fatal startup conditions for the caller.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(HarnessError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| HarnessError::Allocation { capacity })?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                head: 0,
                tail: 0,
                full: false,
                empty: true,
                production_ended: false,
            }),
            item_available: Condvar::new(),
            space_available: Condvar::new(),
        })
    }

    /// Insert without blocking.
    pub fn try_enqueue(&self, item: T) -> Enqueue<T> {
        self.try_enqueue_with(item, |_| {})
    }

    /// Insert without blocking, running `on_insert` on the item while the lock is held and just
    /// before it lands in its slot.
    ///
    /// Producers use the hook to stamp the enqueue timestamp at the insertion instant. On
    /// rejection the hook is not run and nothing in the queue changes.
    pub fn try_enqueue_with(&self, mut item: T, on_insert: impl FnOnce(&mut T)) -> Enqueue<T> {
        {
            let mut ring = self.ring.lock();
            if ring.full {
                return Enqueue::Rejected(item);
            }
            on_insert(&mut item);
            ring.push(item);
        }
        self.item_available.notify_one();
        Enqueue::Accepted
    }

    /// Remove the oldest item, blocking while the queue is empty and production continues.
    ///
    /// Returns `None` (end-of-stream) once production has ended and the queue is drained.
    pub fn dequeue(&self) -> Option<T> {
        let item = {
            let mut ring = self.ring.lock();
            while ring.empty && !ring.production_ended {
                self.item_available.wait(&mut ring);
            }
            ring.pop()?
        };
        self.space_available.notify_one();
        Some(item)
    }

    /// Remove the oldest item if one is present, without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        let item = self.ring.lock().pop()?;
        self.space_available.notify_one();
        Some(item)
    }

    /// Flag that no further items will be inserted and wake every blocked consumer.
    ///
    /// The flag is set under the queue lock, so a consumer is either already parked (and woken
    /// here) or will observe the flag before it parks. One broadcast is enough.
    pub fn mark_production_ended(&self) {
        self.ring.lock().production_ended = true;
        self.item_available.notify_all();
    }

    pub fn is_production_ended(&self) -> bool {
        self.ring.lock().production_ended
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().empty
    }

    pub fn is_full(&self) -> bool {
        self.ring.lock().full
    }
}
