//! Error types for the admission gate.
//!
//! [`Rejected`] is the only error this crate originates. Everything else comes
//! from the wrapped work and is forwarded unchanged; the gate neither logs nor
//! swallows. Callers discriminate by type (matching on [`ShedError`]), never
//! by string.

use crate::aggregate::Aggregate;
use std::fmt;
use thiserror::Error;

/// Boxed error type produced by wrapped work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Admission was refused.
///
/// Carries the winning (highest-value) aggregate at decision time, including
/// its source chain, so a rejection can explain which signal decided and what
/// it was derived from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rejected {
    /// The deciding aggregate.
    pub aggregate: Aggregate,
}

impl Rejected {
    pub fn new(aggregate: Aggregate) -> Self {
        Self { aggregate }
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain = self.aggregate.chain();
        // chain() always yields at least the deciding aggregate itself.
        if let Some(top) = chain.next() {
            write!(f, "request rejected {} is {:.6}", top.name, top.value)?;
        }
        for link in chain {
            write!(f, " because {} is {:.6}", link.name, link.value)?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejected {}

/// Outcome of running work through the gate, when it is not `Ok`.
#[derive(Debug, Error)]
pub enum ShedError {
    /// The gate refused admission; the wrapped work was not invoked.
    #[error(transparent)]
    Rejected(#[from] Rejected),
    /// The wrapped work failed; its error is forwarded unchanged.
    #[error("{0}")]
    Work(BoxError),
}

impl ShedError {
    /// The rejection record, when admission was refused.
    pub fn rejection(&self) -> Option<&Rejected> {
        match self {
            ShedError::Rejected(rejected) => Some(rejected),
            ShedError::Work(_) => None,
        }
    }

    /// Whether this error is a refusal rather than a work failure.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ShedError::Rejected(_))
    }
}
