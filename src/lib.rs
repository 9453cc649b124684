//! `shedder`: probabilistic load-shedding primitives.
//!
//! Per incoming unit of work, a [`Shedder`] decides whether to admit or
//! reject based on a live summary of system load. Rolling windows over
//! observed signals (latency, error rate, in-flight concurrency, host CPU)
//! are summarized by composable aggregators, each exposing a rejection chance
//! in `[0.0, 1.0]`; the gate draws a uniform variate against the worst signal
//! and either rejects with a typed [`Rejected`] error naming the deciding
//! signal, or runs the work decorated so that its outcome feeds the same
//! windows.
//!
//! Goals:
//! - **Local and synchronous**: no queueing or delaying of work, no
//!   coordination across hosts; a rejection is an immediate error.
//! - **As conservative as the most stressed signal**: with several signals
//!   configured, the highest rejection chance wins on every call.
//! - **Explainable**: every rejection carries the winning aggregate and its
//!   source chain, rendering as e.g.
//!   `request rejected ChanceErrorRate is 0.500000 because ErrorRate is 62.500000 ...`.
//!
//! Non-goals:
//! - No persistence of windows across process restarts.
//! - No exact rejection ratios under small samples; admission is a draw.
//! - Transport adapters (HTTP middleware, client wrappers) are thin skins
//!   over the [`Doer`] contract and live outside this crate.
//!
//! # Example
//!
//! ```rust
//! use shedder::{ErrorRateConfig, Shedder};
//!
//! let gate = Shedder::builder()
//!     .error_rate(ErrorRateConfig::default())
//!     .concurrency(64.0, 128.0, None)
//!     .seed(7)
//!     .build();
//!
//! match gate.run(|| Ok(())) {
//!     Ok(()) => {}
//!     Err(e) if e.is_rejected() => { /* surface an overloaded response */ }
//!     Err(_e) => { /* the work's own error, forwarded unchanged */ }
//! }
//! ```

#![forbid(unsafe_code)]

mod window;
pub use window::*;

mod aggregate;
pub use aggregate::*;

mod counter;
pub use counter::*;

mod cpu;
pub use cpu::*;

mod decorator;
pub use decorator::*;

mod error;
pub use error::*;

mod shed;
pub use shed::*;
