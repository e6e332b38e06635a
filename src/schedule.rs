//! Flush scheduling: "run this after the current phase".
//!
//! A [`Schedule`] queues the flush job of a cycle. The job must run after the
//! synchronous code that submitted the first update (and any work already
//! queued in that same phase) has finished, and before work that arrives
//! later from outside, such as newly ready I/O or timers. Everything submitted
//! in between joins the same batch.
//!
//! - [`LocalSetScheduler`] spawns onto the current tokio `LocalSet`. Its run
//!   queue is FIFO, so the flush lands behind every task already queued.
//! - [`futures::executor::LocalSpawner`] runs the flush on the owning
//!   `LocalPool`'s next `run_until_stalled`/`run`, which makes cycle
//!   boundaries fully explicit.

use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::{LocalSpawnExt, SpawnError};

/// Capability to queue a flush job behind the current phase.
pub trait Schedule {
    /// Queue `job`. Returns an error if the executor cannot accept it.
    ///
    /// A job dropped without being polled (the executor shut down) fails
    /// its cycle's updates with `Abandoned`.
    fn schedule(&self, job: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError>;
}

/// Spawns flush jobs onto the current tokio [`LocalSet`](tokio::task::LocalSet).
///
/// `submit` must be called from inside a `LocalSet` (for example within
/// `LocalSet::run_until`). Outside one, tokio panics on spawn; the queue
/// catches that and fails the cycle's updates with `Unscheduled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSetScheduler;

impl Schedule for LocalSetScheduler {
    fn schedule(&self, job: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        // Detached: the job settles its own waiters.
        drop(tokio::task::spawn_local(job));
        Ok(())
    }
}

impl Schedule for LocalSpawner {
    fn schedule(&self, job: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        self.spawn_local(job)
    }
}

impl<S: Schedule + ?Sized> Schedule for Rc<S> {
    fn schedule(&self, job: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        (**self).schedule(job)
    }
}

impl<S: Schedule + ?Sized> Schedule for &S {
    fn schedule(&self, job: LocalBoxFuture<'static, ()>) -> Result<(), SpawnError> {
        (**self).schedule(job)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
