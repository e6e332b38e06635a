//! Errors delivered through an [`UpdateFuture`](crate::result::UpdateFuture).
//!
//! Every waiter for a key receives its own copy of the outcome, so the error
//! type is `Clone`: batch failures are kept behind an `Rc`.

use std::error::Error;
use std::rc::Rc;

/// Boxed error returned by a batch function.
pub type BoxError = Box<dyn Error>;

/// Why a submitted update did not produce a result.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpdateError {
    /// `submit` was called with a value that carries no fields.
    #[error("cannot submit an empty update")]
    EmptyUpdate,
    /// The batch function returned an error for this key.
    #[error("batch function failed: {0}")]
    Batch(Rc<dyn Error>),
    /// The batch function panicked while applying this key.
    #[error("batch function panicked: {0}")]
    Panicked(String),
    /// The scheduler refused to queue the flush for this cycle.
    #[error("flush could not be scheduled: {0}")]
    Unscheduled(String),
    /// The pending update was dropped before it was applied.
    #[error("update was dropped before it was applied")]
    Abandoned,
}

impl UpdateError {
    /// Wrap an error returned by a batch function.
    pub fn batch(err: impl Into<BoxError>) -> Self {
        Self::Batch(Rc::from(err.into()))
    }

    /// Whether this error originated in the batch function (failure or panic).
    pub fn is_batch_failure(&self) -> bool {
        matches!(self, Self::Batch(_) | Self::Panicked(_))
    }
}
