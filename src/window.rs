//! Rolling sample windows: bounded containers of recent `f64` samples.
//!
//! Two retention policies:
//! - [`PointWindow`]: keep the last N samples regardless of age.
//! - [`TimeWindow`]: keep samples grouped into B fixed-duration buckets
//!   covering a sliding interval of B·d.
//!
//! Windows store plain numbers; sample semantics (seconds, counts, percent)
//! are the caller's. Feeds and reads go through a per-window mutex, so a read
//! observes a consistent snapshot and a feed that happens-before a read is
//! reflected in it. Two concurrent feeds may land in either order.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A bounded container of recent samples.
pub trait Window: Send + Sync {
    /// Deliver one sample.
    fn feed(&self, sample: f64);

    /// Visit every currently-retained sample. Order is unspecified.
    ///
    /// The whole iteration runs under the window's lock: the visited set is a
    /// consistent snapshot, and `visit` must not call back into the window.
    fn each(&self, visit: &mut dyn FnMut(f64));

    /// Number of currently-retained samples.
    fn len(&self) -> usize;

    /// Whether the window currently retains no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold over the retained samples. Preferred read primitive.
    fn reduce(&self, init: f64, step: &mut dyn FnMut(f64, f64) -> f64) -> f64 {
        let mut acc = init;
        self.each(&mut |x| acc = step(acc, x));
        acc
    }
}

/// Last-N retention: a fixed-capacity ring of the most recent samples.
#[derive(Debug)]
pub struct PointWindow {
    cap: usize,
    buf: Mutex<VecDeque<f64>>,
}

impl PointWindow {
    /// Create a window retaining the last `cap` samples (minimum 1).
    pub fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            cap,
            buf: Mutex::new(VecDeque::with_capacity(cap)),
        }
    }

    /// Maximum number of samples retained.
    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Window for PointWindow {
    fn feed(&self, sample: f64) {
        let mut buf = self.buf.lock();
        if buf.len() == self.cap {
            buf.pop_front();
        }
        buf.push_back(sample);
    }

    fn each(&self, visit: &mut dyn FnMut(f64)) {
        let buf = self.buf.lock();
        for &x in buf.iter() {
            visit(x);
        }
    }

    fn len(&self) -> usize {
        self.buf.lock().len()
    }
}

#[derive(Debug)]
struct Bucket {
    /// The absolute bucket index this slot currently represents.
    epoch: u64,
    samples: Vec<f64>,
}

/// Time-bucketed retention: `buckets` slots of duration `bucket_len` covering
/// a sliding interval of `buckets * bucket_len`.
///
/// Each slot is stamped with the absolute bucket index (epoch) it represents.
/// A feed into a slot whose epoch is stale clears it first; a read skips any
/// slot older than the sliding interval, so a long pause followed by a read
/// yields zero rather than stale data. A feed exactly at a bucket boundary
/// lands in the newer bucket.
#[derive(Debug)]
pub struct TimeWindow {
    bucket_len: Duration,
    buckets: usize,
    start: Instant,
    slots: Mutex<Vec<Bucket>>,
}

impl TimeWindow {
    /// Create a window of `buckets` slots (minimum 1), each `bucket_len` long
    /// (minimum 1ms). `prealloc_hint` sizes each slot's backing list.
    pub fn new(bucket_len: Duration, buckets: usize, prealloc_hint: usize) -> Self {
        let bucket_len = if bucket_len.is_zero() {
            Duration::from_millis(1)
        } else {
            bucket_len
        };
        let buckets = buckets.max(1);
        let slots = (0..buckets)
            .map(|_| Bucket {
                epoch: 0,
                samples: Vec::with_capacity(prealloc_hint),
            })
            .collect();
        Self {
            bucket_len,
            buckets,
            start: Instant::now(),
            slots: Mutex::new(slots),
        }
    }

    /// Duration of a single bucket.
    pub fn bucket_len(&self) -> Duration {
        self.bucket_len
    }

    /// Number of buckets in the sliding interval.
    pub fn buckets(&self) -> usize {
        self.buckets
    }

    fn epoch_now(&self) -> u64 {
        (self.start.elapsed().as_nanos() / self.bucket_len.as_nanos()) as u64
    }

    /// Oldest epoch still inside the sliding interval at `now`.
    fn oldest_live(&self, now: u64) -> u64 {
        now.saturating_sub(self.buckets as u64 - 1)
    }
}

impl Window for TimeWindow {
    fn feed(&self, sample: f64) {
        let epoch = self.epoch_now();
        let idx = (epoch % self.buckets as u64) as usize;
        let mut slots = self.slots.lock();
        let bucket = &mut slots[idx];
        if bucket.epoch != epoch {
            bucket.samples.clear();
            bucket.epoch = epoch;
        }
        bucket.samples.push(sample);
    }

    fn each(&self, visit: &mut dyn FnMut(f64)) {
        let oldest = self.oldest_live(self.epoch_now());
        let slots = self.slots.lock();
        for bucket in slots.iter() {
            if bucket.epoch < oldest {
                continue;
            }
            for &x in &bucket.samples {
                visit(x);
            }
        }
    }

    fn len(&self) -> usize {
        let oldest = self.oldest_live(self.epoch_now());
        let slots = self.slots.lock();
        slots
            .iter()
            .filter(|b| b.epoch >= oldest)
            .map(|b| b.samples.len())
            .sum()
    }
}
