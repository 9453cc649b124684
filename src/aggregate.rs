//! Aggregators: named computations over windows (or other aggregators) that
//! produce a single scalar, plus the record chain used to explain decisions.
//!
//! Every evaluation yields an [`Aggregate`] record carrying the aggregator's
//! stable name, the computed value, and an optional link to the upstream
//! aggregate the value was derived from. The chain exists solely to render
//! diagnostic rejection reasons; nothing else consumes it.
//!
//! Aggregators are stateless with respect to feeds: repeated
//! [`Aggregator::aggregate`] calls are read-only against their windows.

use crate::window::Window;
use parking_lot::Mutex;
use std::sync::Arc;

/// A value produced by an aggregator, plus its name and an optional chain to
/// the upstream aggregate it was computed from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aggregate {
    /// Stable name of the producing aggregator.
    pub name: String,
    /// The computed value.
    pub value: f64,
    /// The upstream aggregate this value was derived from, if any.
    pub source: Option<Box<Aggregate>>,
}

impl Aggregate {
    /// An aggregate with no upstream source.
    pub fn leaf(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            source: None,
        }
    }

    /// An aggregate derived from `source`.
    pub fn derived(name: impl Into<String>, value: f64, source: Aggregate) -> Self {
        Self {
            name: name.into(),
            value,
            source: Some(Box::new(source)),
        }
    }

    /// Walk the source chain, starting at this record.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }
}

/// Iterator over an aggregate and its source links, root-most last.
#[derive(Debug)]
pub struct Chain<'a> {
    next: Option<&'a Aggregate>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Aggregate;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.source.as_deref();
        Some(current)
    }
}

/// A value-producing node with a stable name.
pub trait Aggregator: Send + Sync {
    /// Compute the current aggregate.
    fn aggregate(&self) -> Aggregate;

    /// Stable name of this aggregator.
    fn name(&self) -> &str;
}

impl<T: Aggregator + ?Sized> Aggregator for Box<T> {
    fn aggregate(&self) -> Aggregate {
        (**self).aggregate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: Aggregator + ?Sized> Aggregator for Arc<T> {
    fn aggregate(&self) -> Aggregate {
        (**self).aggregate()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Σ of the samples retained by a window.
pub struct Sum {
    name: String,
    window: Arc<dyn Window>,
}

impl Sum {
    pub fn new(name: impl Into<String>, window: Arc<dyn Window>) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }
}

impl Aggregator for Sum {
    fn aggregate(&self) -> Aggregate {
        let total = self.window.reduce(0.0, &mut |acc, x| acc + x);
        Aggregate::leaf(self.name.clone(), total)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mean of the samples retained by a window; 0 when the window is empty.
pub struct Average {
    name: String,
    window: Arc<dyn Window>,
}

impl Average {
    pub fn new(name: impl Into<String>, window: Arc<dyn Window>) -> Self {
        Self {
            name: name.into(),
            window,
        }
    }
}

impl Aggregator for Average {
    fn aggregate(&self) -> Aggregate {
        let mut sum = 0.0;
        let mut count = 0usize;
        self.window.each(&mut |x| {
            sum += x;
            count += 1;
        });
        let value = if count == 0 { 0.0 } else { sum / count as f64 };
        Aggregate::leaf(self.name.clone(), value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Linear-interpolation percentile over the retained samples; 0 when empty.
///
/// The p-th percentile uses rank `p * (n - 1) / 100` (0-indexed), interpolated
/// between the neighbouring order statistics. Each call copies the retained
/// samples into a reusable scratch buffer and sorts the copy, so evaluation
/// never perturbs the window.
pub struct Percentile {
    name: String,
    percentile: f64,
    window: Arc<dyn Window>,
    scratch: Mutex<Vec<f64>>,
}

impl Percentile {
    /// `percentile` is given as N% (for example 95.0 or 99.9) and is clamped
    /// to `[0, 100]`. `prealloc_hint` sizes the scratch buffer.
    pub fn new(
        name: impl Into<String>,
        percentile: f64,
        window: Arc<dyn Window>,
        prealloc_hint: usize,
    ) -> Self {
        let percentile = if percentile.is_finite() {
            percentile.clamp(0.0, 100.0)
        } else {
            100.0
        };
        Self {
            name: name.into(),
            percentile,
            window,
            scratch: Mutex::new(Vec::with_capacity(prealloc_hint)),
        }
    }
}

impl Aggregator for Percentile {
    fn aggregate(&self) -> Aggregate {
        let mut scratch = self.scratch.lock();
        scratch.clear();
        self.window.each(&mut |x| scratch.push(x));
        if scratch.is_empty() {
            return Aggregate::leaf(self.name.clone(), 0.0);
        }
        scratch.sort_by(f64::total_cmp);
        let rank = self.percentile * (scratch.len() - 1) as f64 / 100.0;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let value = if lo == hi {
            scratch[lo]
        } else {
            scratch[lo] + (scratch[hi] - scratch[lo]) * (rank - lo as f64)
        };
        Aggregate::leaf(self.name.clone(), value)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// `numerator / denominator * scale`; 0 when the denominator reads 0.
///
/// The emitted source chain is result → numerator → denominator.
pub struct Ratio<N, D> {
    name: String,
    numerator: N,
    denominator: D,
    scale: f64,
}

impl<N, D> Ratio<N, D> {
    /// A percentage ratio (scale 100).
    pub fn new(name: impl Into<String>, numerator: N, denominator: D) -> Self {
        Self::with_scale(name, numerator, denominator, 100.0)
    }

    pub fn with_scale(name: impl Into<String>, numerator: N, denominator: D, scale: f64) -> Self {
        Self {
            name: name.into(),
            numerator,
            denominator,
            scale,
        }
    }
}

impl<N: Aggregator, D: Aggregator> Aggregator for Ratio<N, D> {
    fn aggregate(&self) -> Aggregate {
        let mut numerator = self.numerator.aggregate();
        let denominator = self.denominator.aggregate();
        let value = if denominator.value == 0.0 {
            0.0
        } else {
            numerator.value / denominator.value * self.scale
        };
        numerator.source = Some(Box::new(denominator));
        Aggregate::derived(self.name.clone(), value, numerator)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Maps a raw value to a `[0, 1]` chance by linear interpolation between
/// `lower` and `upper`: 0 at or below `lower`, 1 at or above `upper`.
///
/// `upper > lower` must hold for a meaningful signal; thresholds are in the
/// raw units of the inner aggregator.
pub struct LinearThreshold<A> {
    name: String,
    inner: A,
    lower: f64,
    upper: f64,
}

impl<A> LinearThreshold<A> {
    pub fn new(name: impl Into<String>, inner: A, lower: f64, upper: f64) -> Self {
        Self {
            name: name.into(),
            inner,
            lower,
            upper,
        }
    }
}

impl<A: Aggregator> Aggregator for LinearThreshold<A> {
    fn aggregate(&self) -> Aggregate {
        let inner = self.inner.aggregate();
        let value = if inner.value <= self.lower {
            0.0
        } else if inner.value >= self.upper {
            1.0
        } else {
            (inner.value - self.lower) / (self.upper - self.lower)
        };
        Aggregate::derived(self.name.clone(), value, inner)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Suppresses a derived value until an observed window has accumulated a
/// minimum number of samples; reads exactly 0 below the floor.
///
/// This prevents early-sample oscillation: an error-rate signal gated on its
/// request window cannot read 100% off the first failing request.
pub struct MinSample<A> {
    min: usize,
    observed: Arc<dyn Window>,
    inner: A,
}

impl<A> MinSample<A> {
    pub fn new(min: usize, observed: Arc<dyn Window>, inner: A) -> Self {
        Self {
            min,
            observed,
            inner,
        }
    }
}

impl<A: Aggregator> Aggregator for MinSample<A> {
    fn aggregate(&self) -> Aggregate {
        if self.observed.len() >= self.min {
            self.inner.aggregate()
        } else {
            Aggregate::leaf(self.inner.name().to_owned(), 0.0)
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// The largest of several aggregates; ties go to the first-listed.
pub struct Maximum {
    inners: Vec<Box<dyn Aggregator>>,
}

impl Maximum {
    pub fn new(inners: Vec<Box<dyn Aggregator>>) -> Self {
        Self { inners }
    }
}

impl Aggregator for Maximum {
    fn aggregate(&self) -> Aggregate {
        let mut best: Option<Aggregate> = None;
        for inner in &self.inners {
            let candidate = inner.aggregate();
            if best.as_ref().map(|b| candidate.value > b.value).unwrap_or(true) {
                best = Some(candidate);
            }
        }
        best.unwrap_or_else(|| Zero.aggregate())
    }

    fn name(&self) -> &str {
        "Maximum"
    }
}

/// Constant 0. Installed by default so an unconfigured shedder never rejects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zero;

impl Aggregator for Zero {
    fn aggregate(&self) -> Aggregate {
        Aggregate::leaf("Zero", 0.0)
    }

    fn name(&self) -> &str {
        "Zero"
    }
}
