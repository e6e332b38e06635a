//! The coalescing queue: per-cycle pending table, `submit`, and the flush step.
//!
//! ```ignore
//! let queue = CoalescingQueue::new(|update: Update<u32, BTreeMap<&str, &str>>| async move {
//!     store.write(update.key, update.value).await
//! });
//! let a = queue.submit(1, BTreeMap::from([("a", "a")])); // table: 1 -> { a }
//! let b = queue.submit(1, BTreeMap::from([("b", "b")])); // table: 1 -> { a, b }
//! assert!(a.ptr_eq(&b));
//! // After the current phase the batch function runs once for key 1.
//! ```
//!
//! The first submission of a cycle schedules one flush job. The job detaches
//! the whole table on its first poll, so anything submitted after that point
//! (including from inside the batch function) opens the next cycle.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use futures::stream::{self, StreamExt};
use tracing::{debug, debug_span, trace, warn, Instrument};

use crate::config::QueueConfig;
use crate::error::{BoxError, UpdateError};
use crate::patch::Patch;
use crate::result::{self, Outcome, Resolver, UpdateFuture};
use crate::schedule::{LocalSetScheduler, Schedule};

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// The argument handed to the batch function: one key and its merged value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update<K, V> {
    /// The entity being updated.
    pub key: K,
    /// Every patch submitted for `key` in this cycle, merged.
    pub value: V,
}

type BatchFn<K, V, R> = dyn Fn(Update<K, V>) -> LocalBoxFuture<'static, Result<R, BoxError>>;

// ---------------------------------------------------------------------------
// Pending table
// ---------------------------------------------------------------------------

struct PendingEntry<K, V, R> {
    key: K,
    value: V,
    future: UpdateFuture<R>,
    resolver: Resolver<R>,
}

/// Pending entries in submission order, indexed by key.
struct Table<K, V, R> {
    entries: Vec<PendingEntry<K, V, R>>,
    index: HashMap<K, usize>,
    /// Flushes started so far.
    cycle: u64,
}

impl<K: Hash + Eq + Clone, V, R> Table<K, V, R> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            cycle: 0,
        }
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut PendingEntry<K, V, R>> {
        let slot = *self.index.get(key)?;
        self.entries.get_mut(slot)
    }

    fn insert(&mut self, entry: PendingEntry<K, V, R>) {
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
    }
}

impl<K, V, R> Table<K, V, R> {
    fn take_entries(&mut self) -> Vec<PendingEntry<K, V, R>> {
        self.index.clear();
        mem::take(&mut self.entries)
    }

    /// Swap the live table for an empty one and open the next cycle.
    fn detach(&mut self) -> (u64, Vec<PendingEntry<K, V, R>>) {
        self.cycle += 1;
        (self.cycle, self.take_entries())
    }
}

// ---------------------------------------------------------------------------
// CoalescingQueue
// ---------------------------------------------------------------------------

/// Merges same-key updates submitted within one cycle and applies each key
/// once through the batch function.
///
/// Cloning the queue yields another handle to the same table, which lets the
/// batch function itself submit follow-up updates.
pub struct CoalescingQueue<K, V, R> {
    table: Rc<RefCell<Table<K, V, R>>>,
    batch: Rc<BatchFn<K, V, R>>,
    scheduler: Rc<dyn Schedule>,
    config: Rc<QueueConfig>,
}

impl<K, V, R> CoalescingQueue<K, V, R>
where
    K: Hash + Eq + Clone + 'static,
    V: Patch + 'static,
    R: Clone + 'static,
{
    /// Create a queue that flushes on the current tokio `LocalSet`.
    ///
    /// Submissions must happen inside a `LocalSet`. Outside one, tokio
    /// refuses the flush job and the submitted update fails with
    /// [`UpdateError::Unscheduled`].
    pub fn new<F, Fut, E>(batch_fn: F) -> Self
    where
        F: Fn(Update<K, V>) -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::with_config(batch_fn, LocalSetScheduler, QueueConfig::default())
    }

    /// Create a queue that flushes through `scheduler`.
    pub fn with_scheduler<F, Fut, E>(batch_fn: F, scheduler: impl Schedule + 'static) -> Self
    where
        F: Fn(Update<K, V>) -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        E: Into<BoxError> + 'static,
    {
        Self::with_config(batch_fn, scheduler, QueueConfig::default())
    }

    /// Create a queue with an explicit scheduler and configuration.
    pub fn with_config<F, Fut, E>(
        batch_fn: F,
        scheduler: impl Schedule + 'static,
        config: QueueConfig,
    ) -> Self
    where
        F: Fn(Update<K, V>) -> Fut + 'static,
        Fut: Future<Output = Result<R, E>> + 'static,
        E: Into<BoxError> + 'static,
    {
        let batch: Rc<BatchFn<K, V, R>> = Rc::new(move |update: Update<K, V>| {
            let pending = batch_fn(update);
            async move { pending.await.map_err(Into::into) }.boxed_local()
        });
        Self {
            table: Rc::new(RefCell::new(Table::new())),
            batch,
            scheduler: Rc::new(scheduler),
            config: Rc::new(config),
        }
    }

    /// Queue `value` for `key` and return the shared future for that key.
    ///
    /// The first submission for a key in a cycle stores `value` and creates
    /// the key's future; later submissions merge into the stored value (see
    /// [`Patch::merge`]) and return a clone of the same future. The first
    /// key of a cycle schedules the flush. Empty values fail immediately with
    /// [`UpdateError::EmptyUpdate`] and leave the queue untouched.
    ///
    /// If the scheduler refuses or panics on the flush job, the cycle's
    /// updates fail with [`UpdateError::Unscheduled`]. If the job is dropped
    /// before it runs (the executor shut down), they fail with
    /// [`UpdateError::Abandoned`]. Either way the next submission starts a
    /// fresh cycle.
    pub fn submit(&self, key: K, value: V) -> UpdateFuture<R> {
        if value.is_empty() {
            trace!(queue = %self.config.label, "rejected empty update");
            return UpdateFuture::failed(UpdateError::EmptyUpdate);
        }

        let (future, starts_cycle) = {
            let mut table = self.table.borrow_mut();
            if let Some(entry) = table.get_mut(&key) {
                entry.value.merge(value);
                trace!(queue = %self.config.label, "merged into pending update");
                return entry.future.clone();
            }

            let (resolver, future) = result::channel();
            let starts_cycle = table.entries.is_empty();
            table.insert(PendingEntry {
                key,
                value,
                future: future.clone(),
                resolver,
            });
            (future, starts_cycle)
        };

        if starts_cycle {
            self.schedule_flush();
        }
        future
    }

    /// Number of keys waiting for the next flush.
    pub fn pending_keys(&self) -> usize {
        self.table.borrow().entries.len()
    }

    /// Whether no update is waiting.
    pub fn is_idle(&self) -> bool {
        self.pending_keys() == 0
    }

    /// Whether `key` has an update waiting in the current cycle.
    pub fn contains_key(&self, key: &K) -> bool {
        self.table.borrow().index.contains_key(key)
    }

    /// Number of flushes started so far.
    pub fn cycle(&self) -> u64 {
        self.table.borrow().cycle
    }

    /// The queue's configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn schedule_flush(&self) {
        let state = Rc::new(Cell::new(JobState::HandingOff));
        let guard = FlushGuard {
            table: Rc::clone(&self.table),
            config: Rc::clone(&self.config),
            state: Rc::clone(&state),
        };
        let job = flush(guard, Rc::clone(&self.batch)).boxed_local();

        let handed_off = panic::catch_unwind(AssertUnwindSafe(|| self.scheduler.schedule(job)));
        let scheduled = match handed_off {
            Ok(result) => result.map_err(|err| err.to_string()),
            Err(payload) => Err(panic_message(&*payload)),
        };

        match (scheduled, state.get()) {
            (Ok(()), JobState::HandingOff | JobState::Queued) => {
                state.set(JobState::Queued);
                trace!(queue = %self.config.label, "flush scheduled");
            }
            (Ok(()), JobState::Dropped) => {
                warn!(queue = %self.config.label, "scheduler dropped the flush job");
                drop(self.table.borrow_mut().take_entries());
            }
            (_, JobState::Started) => {
                trace!(queue = %self.config.label, "flush ran during scheduling");
            }
            (Err(err), _) => {
                warn!(queue = %self.config.label, %err, "flush could not be scheduled");
                let entries = self.table.borrow_mut().take_entries();
                for entry in entries {
                    entry.resolver.reject(UpdateError::Unscheduled(err.clone()));
                }
            }
        }
    }
}

impl<K, V, R> Clone for CoalescingQueue<K, V, R> {
    fn clone(&self) -> Self {
        Self {
            table: Rc::clone(&self.table),
            batch: Rc::clone(&self.batch),
            scheduler: Rc::clone(&self.scheduler),
            config: Rc::clone(&self.config),
        }
    }
}

impl<K, V, R> fmt::Debug for CoalescingQueue<K, V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.borrow();
        f.debug_struct("CoalescingQueue")
            .field("label", &self.config.label)
            .field("pending_keys", &table.entries.len())
            .field("cycle", &table.cycle)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Flush
// ---------------------------------------------------------------------------

/// Where a flush job is in its life, shared between the job and `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    /// Inside `Schedule::schedule`; the caller handles a drop here.
    HandingOff,
    /// Accepted by the scheduler, not yet polled.
    Queued,
    /// Polled at least once; the job owns its entries.
    Started,
    /// Dropped during hand-off without being polled.
    Dropped,
}

/// Owned by a flush job. Dropping a queued job that never ran releases the
/// table's entries, so their waiters see `Abandoned` and the next submission
/// schedules a new job.
struct FlushGuard<K, V, R> {
    table: Rc<RefCell<Table<K, V, R>>>,
    config: Rc<QueueConfig>,
    state: Rc<Cell<JobState>>,
}

impl<K, V, R> FlushGuard<K, V, R> {
    fn start(&self) -> (u64, Vec<PendingEntry<K, V, R>>) {
        self.state.set(JobState::Started);
        self.table.borrow_mut().detach()
    }
}

impl<K, V, R> Drop for FlushGuard<K, V, R> {
    fn drop(&mut self) {
        match self.state.get() {
            JobState::HandingOff => self.state.set(JobState::Dropped),
            JobState::Queued => {
                let entries = match self.table.try_borrow_mut() {
                    Ok(mut table) => table.take_entries(),
                    Err(_) => return,
                };
                if !entries.is_empty() {
                    warn!(
                        queue = %self.config.label,
                        keys = entries.len(),
                        "flush job dropped before it ran, abandoning pending updates"
                    );
                }
            }
            JobState::Started | JobState::Dropped => {}
        }
    }
}

/// One cycle's flush job. Detaches the table on first poll.
async fn flush<K, V, R>(guard: FlushGuard<K, V, R>, batch: Rc<BatchFn<K, V, R>>) {
    let (cycle, entries) = guard.start();
    let config = Rc::clone(&guard.config);
    let span = debug_span!("flush", queue = %config.label, cycle, keys = entries.len());

    async move {
        debug!("applying coalesced updates");
        let batch = &*batch;
        stream::iter(entries)
            .for_each_concurrent(config.max_in_flight, move |entry| apply(batch, entry))
            .await;
    }
    .instrument(span)
    .await;
}

/// Invoke the batch function for one entry and settle its waiters.
///
/// The call itself happens here, synchronously, so batch calls start in
/// submission order. Panics are caught per key.
fn apply<K, V, R>(
    batch: &BatchFn<K, V, R>,
    entry: PendingEntry<K, V, R>,
) -> impl Future<Output = ()> {
    let PendingEntry {
        key,
        value,
        resolver,
        ..
    } = entry;
    let call = panic::catch_unwind(AssertUnwindSafe(|| batch(Update { key, value })));

    async move {
        let outcome: Outcome<R> = match call {
            Ok(pending) => match AssertUnwindSafe(pending).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(UpdateError::Batch(Rc::from(err))),
                Err(payload) => Err(UpdateError::Panicked(panic_message(&*payload))),
            },
            Err(payload) => Err(UpdateError::Panicked(panic_message(&*payload))),
        };

        match &outcome {
            Ok(_) => trace!("update applied"),
            Err(err @ UpdateError::Panicked(_)) => warn!(%err, "batch function panicked"),
            Err(err) => debug!(%err, "batch function failed"),
        }
        resolver.settle(outcome);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}

// ===========================================================================
// Tests
// ===========================================================================
