//! The admission gate.
//!
//! A [`Shedder`] holds a list of root aggregators, each expected to expose a
//! rejection chance in `[0.0, 1.0]`, and a chain of decorators. On each call
//! it evaluates every root aggregator, keeps the worst (highest) one, draws a
//! uniform variate in `[0, 1)`, and either returns [`Rejected`] carrying the
//! winning aggregate or runs the decorated work. Values outside `[0, 1]` are
//! not clamped: a misconfigured aggregator can cause always- or never-reject.
//!
//! Construction goes through [`ShedderBuilder`], whose options mirror the
//! supported load signals (latency, error rate, concurrency, CPU) and wire
//! both sides of the feedback loop at once: the aggregator that reads a window
//! and the decorator that feeds it.

use crate::aggregate::{
    Aggregate, Aggregator, Average, LinearThreshold, MinSample, Percentile, Ratio, Sum, Zero,
};
use crate::counter::InFlight;
use crate::cpu::CpuSampler;
use crate::decorator::{ConcurrencyTracker, Decorator, ErrorRateTracker, LatencyTracker, Work};
use crate::error::{BoxError, Rejected, ShedError};
use crate::window::{TimeWindow, Window};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

/// Backing-list size used when a preallocation hint of 0 is given.
pub const DEFAULT_PREALLOC_HINT: usize = 1000;

/// Admission-controlled execution of units of work.
///
/// The object-safe seam for transport adapters (request handlers, client
/// round-trippers): they hold a `dyn Doer`, invoke [`Doer::call`], and surface
/// an "overloaded" response on [`ShedError::Rejected`].
pub trait Doer: Send + Sync {
    /// Run `work` under admission control.
    fn call(&self, work: Work<'_>) -> Result<(), ShedError>;
}

/// Rolling-window parameters for a latency signal.
///
/// `lower`/`upper` are in seconds; between them the rejection chance rises
/// linearly from 0 to 1. The window covers `buckets * bucket` of history.
/// A `prealloc_hint` of 0 selects [`DEFAULT_PREALLOC_HINT`]. `min_points`
/// suppresses the signal until that many samples are retained.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LatencyConfig {
    pub lower: f64,
    pub upper: f64,
    pub bucket: Duration,
    pub buckets: usize,
    pub prealloc_hint: usize,
    pub min_points: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            lower: 0.5,
            upper: 5.0,
            bucket: Duration::from_secs(1),
            buckets: 60,
            prealloc_hint: 0,
            min_points: 10,
        }
    }
}

/// Rolling-window parameters for an error-rate signal.
///
/// `lower`/`upper` are percentages in `[0, 100]`. `min_points` is the number
/// of requests that must be observed before the rate reads non-zero.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorRateConfig {
    pub lower: f64,
    pub upper: f64,
    pub bucket: Duration,
    pub buckets: usize,
    pub prealloc_hint: usize,
    pub min_points: usize,
}

impl Default for ErrorRateConfig {
    fn default() -> Self {
        Self {
            lower: 50.0,
            upper: 90.0,
            bucket: Duration::from_secs(1),
            buckets: 60,
            prealloc_hint: 0,
            min_points: 10,
        }
    }
}

/// Parameters for the background CPU signal.
///
/// `lower`/`upper` are CPU percentages in `[0, 100]`; the rolling average
/// spans `window_size * polling_interval`.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuConfig {
    pub lower: f64,
    pub upper: f64,
    pub polling_interval: Duration,
    pub window_size: usize,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            lower: 80.0,
            upper: 95.0,
            polling_interval: Duration::from_secs(1),
            window_size: 10,
        }
    }
}

/// The gate: rejects a percentage of work based on aggregated load signals.
pub struct Shedder {
    aggregators: Vec<Box<dyn Aggregator>>,
    decorators: Vec<Box<dyn Decorator>>,
    rng: Mutex<StdRng>,
}

impl Shedder {
    /// Start configuring a shedder.
    pub fn builder() -> ShedderBuilder {
        ShedderBuilder::default()
    }

    /// The current worst (highest-value) aggregate across all root signals.
    ///
    /// This is the rejection chance the next call will draw against; exposed
    /// for observability and deterministic tests.
    pub fn pressure(&self) -> Aggregate {
        let mut worst: Option<Aggregate> = None;
        for aggregator in &self.aggregators {
            let candidate = aggregator.aggregate();
            if worst.as_ref().map(|w| candidate.value > w.value).unwrap_or(true) {
                worst = Some(candidate);
            }
        }
        worst.unwrap_or_else(|| Zero.aggregate())
    }

    /// Run `work` under admission control.
    ///
    /// Evaluates the root aggregators, draws a chance in `[0, 1)`, and either
    /// returns [`ShedError::Rejected`] without invoking `work`, or invokes the
    /// decorated work and forwards its result verbatim.
    pub fn run<F>(&self, work: F) -> Result<(), ShedError>
    where
        F: FnOnce() -> Result<(), BoxError>,
    {
        let worst = self.pressure();
        let chance: f64 = self.rng.lock().gen();
        if chance < worst.value {
            return Err(ShedError::Rejected(Rejected::new(worst)));
        }
        let mut job: Work<'_> = Box::new(work);
        for decorator in &self.decorators {
            job = decorator.wrap(job);
        }
        job().map_err(ShedError::Work)
    }
}

impl Doer for Shedder {
    fn call(&self, work: Work<'_>) -> Result<(), ShedError> {
        self.run(work)
    }
}

impl Default for Shedder {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Configures the load signals of a [`Shedder`].
///
/// Each signal option appends one root aggregator and, when the signal is fed
/// from call outcomes, one decorator. A builder with no signals produces a
/// shedder that never rejects (a [`Zero`] aggregator is installed).
#[derive(Default)]
pub struct ShedderBuilder {
    aggregators: Vec<Box<dyn Aggregator>>,
    decorators: Vec<Box<dyn Decorator>>,
    seed: Option<u64>,
}

impl ShedderBuilder {
    /// Shed on average request latency within a rolling time window.
    ///
    /// Installs a latency-feeding decorator and an aggregator chain
    /// `MinSample(LinearThreshold(Average))`; the emitted names are
    /// `"ChanceAverageLatency"` over `"AverageLatency"`.
    pub fn average_latency(mut self, cfg: LatencyConfig) -> Self {
        let window = time_window(cfg.bucket, cfg.buckets, cfg.prealloc_hint);
        let chance = LinearThreshold::new(
            "ChanceAverageLatency",
            Average::new("AverageLatency", Arc::clone(&window) as Arc<dyn Window>),
            cfg.lower,
            cfg.upper,
        );
        self.aggregators.push(Box::new(MinSample::new(
            cfg.min_points,
            Arc::clone(&window) as Arc<dyn Window>,
            chance,
        )));
        self.decorators.push(Box::new(LatencyTracker::new(window)));
        self
    }

    /// Shed on a latency percentile rather than the average.
    ///
    /// `percentile` is given as N%, for example 95.0 or 99.9.
    pub fn percentile_latency(mut self, cfg: LatencyConfig, percentile: f64) -> Self {
        let window = time_window(cfg.bucket, cfg.buckets, cfg.prealloc_hint);
        let chance = LinearThreshold::new(
            format!("ChanceP{percentile}Latency"),
            Percentile::new(
                format!("P{percentile}Latency"),
                percentile,
                Arc::clone(&window) as Arc<dyn Window>,
                hint(cfg.prealloc_hint),
            ),
            cfg.lower,
            cfg.upper,
        );
        self.aggregators.push(Box::new(MinSample::new(
            cfg.min_points,
            Arc::clone(&window) as Arc<dyn Window>,
            chance,
        )));
        self.decorators.push(Box::new(LatencyTracker::new(window)));
        self
    }

    /// Shed on the error rate within a rolling time window.
    ///
    /// Tracks request and error counts in two windows fed by one decorator;
    /// the rate is their percentage ratio, suppressed until `min_points`
    /// requests are retained so a lone early failure cannot read 100%.
    pub fn error_rate(mut self, cfg: ErrorRateConfig) -> Self {
        let requests = time_window(cfg.bucket, cfg.buckets, cfg.prealloc_hint);
        let errors = time_window(cfg.bucket, cfg.buckets, cfg.prealloc_hint);
        let rate = Ratio::new(
            "ErrorRate",
            MinSample::new(
                cfg.min_points,
                Arc::clone(&requests) as Arc<dyn Window>,
                Sum::new("ErrorCount", Arc::clone(&errors) as Arc<dyn Window>),
            ),
            Sum::new("RequestCount", Arc::clone(&requests) as Arc<dyn Window>),
        );
        self.aggregators.push(Box::new(LinearThreshold::new(
            "ChanceErrorRate",
            rate,
            cfg.lower,
            cfg.upper,
        )));
        self.decorators
            .push(Box::new(ErrorRateTracker::new(requests, errors)));
        self
    }

    /// Shed on in-flight concurrency between `lower` and `upper`.
    ///
    /// Pass an existing counter to share it with other instrumentation, or
    /// `None` to create one. The counter is adjusted by a decorator around
    /// every admitted call.
    pub fn concurrency(mut self, lower: f64, upper: f64, counter: Option<Arc<InFlight>>) -> Self {
        let counter = counter.unwrap_or_default();
        self.aggregators.push(Box::new(LinearThreshold::new(
            "ChanceConcurrency",
            Arc::clone(&counter),
            lower,
            upper,
        )));
        self.decorators
            .push(Box::new(ConcurrencyTracker::new(counter)));
        self
    }

    /// Shed on a rolling average of host CPU usage.
    ///
    /// Starts the background sampler; it stops when the shedder is dropped.
    pub fn cpu(mut self, cfg: CpuConfig) -> Self {
        let sampler = CpuSampler::new(cfg.polling_interval, cfg.window_size);
        self.aggregators.push(Box::new(LinearThreshold::new(
            "ChanceCPU",
            sampler,
            cfg.lower,
            cfg.upper,
        )));
        self
    }

    /// Add an arbitrary aggregator to the evaluation.
    ///
    /// The result is interpreted as a rejection chance; the caller is
    /// responsible for keeping it in `[0.0, 1.0]`.
    pub fn aggregator(mut self, aggregator: impl Aggregator + 'static) -> Self {
        self.aggregators.push(Box::new(aggregator));
        self
    }

    /// Seed the randomness source for reproducible draws.
    ///
    /// Without a seed the shedder draws from an entropy-seeded generator.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Finish construction.
    pub fn build(mut self) -> Shedder {
        if self.aggregators.is_empty() {
            self.aggregators.push(Box::new(Zero));
        }
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Shedder {
            aggregators: self.aggregators,
            decorators: self.decorators,
            rng: Mutex::new(rng),
        }
    }
}

fn hint(prealloc_hint: usize) -> usize {
    if prealloc_hint == 0 {
        DEFAULT_PREALLOC_HINT
    } else {
        prealloc_hint
    }
}

fn time_window(bucket: Duration, buckets: usize, prealloc_hint: usize) -> Arc<TimeWindow> {
    Arc::new(TimeWindow::new(bucket, buckets, hint(prealloc_hint)))
}
