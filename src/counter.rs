//! In-flight work counter.
//!
//! A single shared integer adjusted on admission and completion. The counter
//! participates on both sides of the feedback loop: a decorator adjusts it
//! around each admitted invocation, and its [`Aggregator`] view exposes the
//! current value (name `"Concurrency"`) to the gate. Share it by handle
//! (`Arc`); never duplicate it.

use crate::aggregate::{Aggregate, Aggregator};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicI64, Ordering};

/// Lock-free count of operations currently in flight.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicI64,
    drain_lock: Mutex<()>,
    drained: Condvar,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` in-flight operations.
    pub fn add(&self, delta: i64) {
        let previous = self.current.fetch_add(delta, Ordering::AcqRel);
        if previous + delta <= 0 {
            self.notify();
        }
    }

    /// Mark one operation as complete.
    pub fn done(&self) {
        let previous = self.current.fetch_sub(1, Ordering::AcqRel);
        if previous - 1 <= 0 {
            self.notify();
        }
    }

    /// The current in-flight count.
    pub fn value(&self) -> i64 {
        self.current.load(Ordering::Acquire)
    }

    /// Block until the in-flight count returns to zero or below.
    ///
    /// Useful for draining outstanding work in shutdown paths and test
    /// harnesses.
    pub fn wait(&self) {
        let mut guard = self.drain_lock.lock();
        while self.current.load(Ordering::Acquire) > 0 {
            self.drained.wait(&mut guard);
        }
    }

    fn notify(&self) {
        let _guard = self.drain_lock.lock();
        self.drained.notify_all();
    }
}

impl Aggregator for InFlight {
    fn aggregate(&self) -> Aggregate {
        Aggregate::leaf("Concurrency", self.value() as f64)
    }

    fn name(&self) -> &str {
        "Concurrency"
    }
}
