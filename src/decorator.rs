//! Decorators: instrumentation wrapped around admitted work.
//!
//! A decorator takes a unit of work and returns a new unit of work that
//! performs side effects around the inner invocation: recording latency,
//! counting requests and errors, tracking in-flight concurrency. Decorators
//! are oblivious to one another and to the caller's error type; the inner
//! result is always propagated unchanged.

use crate::counter::InFlight;
use crate::error::BoxError;
use crate::window::Window;
use std::sync::Arc;
use std::time::Instant;

/// A unit of work as seen by the decorator chain.
pub type Work<'a> = Box<dyn FnOnce() -> Result<(), BoxError> + 'a>;

/// Wraps a unit of work with side effects around the inner invocation.
pub trait Decorator: Send + Sync {
    fn wrap<'a>(&'a self, next: Work<'a>) -> Work<'a>;
}

/// Feeds elapsed seconds into a window, whatever the inner outcome.
pub struct LatencyTracker {
    window: Arc<dyn Window>,
}

impl LatencyTracker {
    pub fn new(window: Arc<dyn Window>) -> Self {
        Self { window }
    }
}

impl Decorator for LatencyTracker {
    fn wrap<'a>(&'a self, next: Work<'a>) -> Work<'a> {
        Box::new(move || {
            let start = Instant::now();
            let result = next();
            self.window.feed(start.elapsed().as_secs_f64());
            result
        })
    }
}

/// Feeds 1 into the request window before invocation and 1 into the error
/// window when the inner work fails. Any non-`Ok` return counts as a failure;
/// error kinds are not differentiated.
pub struct ErrorRateTracker {
    requests: Arc<dyn Window>,
    errors: Arc<dyn Window>,
}

impl ErrorRateTracker {
    pub fn new(requests: Arc<dyn Window>, errors: Arc<dyn Window>) -> Self {
        Self { requests, errors }
    }
}

impl Decorator for ErrorRateTracker {
    fn wrap<'a>(&'a self, next: Work<'a>) -> Work<'a> {
        Box::new(move || {
            self.requests.feed(1.0);
            let result = next();
            if result.is_err() {
                self.errors.feed(1.0);
            }
            result
        })
    }
}

/// Adjusts a shared in-flight counter around the inner invocation. The
/// decrement is guaranteed even if the inner work panics.
pub struct ConcurrencyTracker {
    counter: Arc<InFlight>,
}

impl ConcurrencyTracker {
    pub fn new(counter: Arc<InFlight>) -> Self {
        Self { counter }
    }
}

struct DoneOnDrop<'a>(&'a InFlight);

impl Drop for DoneOnDrop<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

impl Decorator for ConcurrencyTracker {
    fn wrap<'a>(&'a self, next: Work<'a>) -> Work<'a> {
        Box::new(move || {
            self.counter.add(1);
            let _guard = DoneOnDrop(&self.counter);
            next()
        })
    }
}
