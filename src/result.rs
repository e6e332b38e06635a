//! Shared single-assignment result cell.
//!
//! [`channel`] returns a [`Resolver`] (the one producer, held by the queue's
//! flush step) and an [`UpdateFuture`] (cloned out to every caller that
//! submitted for the same key in the same cycle). Settling consumes the
//! resolver, so a cell can only ever be settled once. Dropping an unsettled
//! resolver settles the cell with [`UpdateError::Abandoned`].

use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use crate::error::UpdateError;

/// The value every waiter of a key receives.
pub type Outcome<R> = Result<R, UpdateError>;

/// Create an unsettled cell.
pub fn channel<R: Clone>() -> (Resolver<R>, UpdateFuture<R>) {
    let (tx, rx) = oneshot::channel();
    let settled = Rc::new(Cell::new(false));
    (
        Resolver {
            tx: Some(tx),
            settled: Rc::clone(&settled),
        },
        UpdateFuture {
            shared: rx.shared(),
            settled,
        },
    )
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Producer half of the cell.
pub struct Resolver<R> {
    tx: Option<oneshot::Sender<Outcome<R>>>,
    settled: Rc<Cell<bool>>,
}

impl<R> Resolver<R> {
    /// Settle the cell successfully.
    pub fn resolve(self, value: R) {
        self.settle(Ok(value));
    }

    /// Settle the cell with a failure.
    pub fn reject(self, err: UpdateError) {
        self.settle(Err(err));
    }

    /// Settle the cell with `outcome`.
    pub fn settle(mut self, outcome: Outcome<R>) {
        self.settled.set(true);
        if let Some(tx) = self.tx.take() {
            // Every handle may already be gone; nobody is left to tell.
            let _ = tx.send(outcome);
        }
    }
}

impl<R> Drop for Resolver<R> {
    fn drop(&mut self) {
        // Dropping the sender wakes the waiters with `Canceled`.
        self.settled.set(true);
    }
}

impl<R> fmt::Debug for Resolver<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("settled", &self.settled.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// UpdateFuture
// ---------------------------------------------------------------------------

/// Handle to the eventual outcome of a coalesced update.
///
/// Clones observe the same cell. Awaiting yields `Ok(result)` from the batch
/// function or the [`UpdateError`] that prevented it.
pub struct UpdateFuture<R> {
    shared: Shared<oneshot::Receiver<Outcome<R>>>,
    settled: Rc<Cell<bool>>,
}

impl<R: Clone> UpdateFuture<R> {
    /// A future that has already failed with `err`.
    pub fn failed(err: UpdateError) -> Self {
        let (resolver, future) = channel();
        resolver.reject(err);
        future
    }

    /// Whether the cell behind this handle has been settled.
    pub fn is_settled(&self) -> bool {
        self.settled.get()
    }

    /// Whether two handles observe the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.settled, &other.settled)
    }
}

impl<R> Clone for UpdateFuture<R> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            settled: Rc::clone(&self.settled),
        }
    }
}

impl<R: Clone> Future for UpdateFuture<R> {
    type Output = Outcome<R>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.shared
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(UpdateError::Abandoned)))
    }
}

impl<R> fmt::Debug for UpdateFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateFuture")
            .field("settled", &self.settled.get())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
