//! # update-coalescer
//!
//! Per-tick update coalescing for single-threaded async Rust.
//!
//! Callers [`submit`](queue::CoalescingQueue::submit) partial updates keyed by
//! an identity. Every update submitted for the same key before the current
//! cycle flushes is merged into one value, the batch function is called once
//! per key with that value, and every caller for the key receives the same
//! result. Inspired by the dataloader pattern, but instead of deduplicating
//! identical loads it merges distinct writes.
//!
//! ## Core Systems
//!
//! - **[`queue`]** — `CoalescingQueue`: pending table, `submit`, flush step
//! - **[`result`]** — `UpdateFuture`/`Resolver`: shared single-assignment result
//! - **[`schedule`]** — `Schedule` capability (tokio `LocalSet`, `futures` `LocalPool`)
//! - **[`patch`]** — `Patch` shallow-merge contract and map impls
//! - **[`config`]** — `QueueConfig` builder
//! - **[`error`]** — `UpdateError`

// Lets `#[derive(Patch)]` output (which names `::update_coalescer`) resolve
// inside this crate too.
extern crate self as update_coalescer;

// Foundation
pub mod config;
pub mod error;
pub mod patch;

// Result plumbing and scheduling
pub mod result;
pub mod schedule;

// Queue
pub mod queue;

pub use config::QueueConfig;
pub use error::{BoxError, UpdateError};
pub use patch::Patch;
pub use queue::{CoalescingQueue, Update};
pub use result::UpdateFuture;
pub use schedule::{LocalSetScheduler, Schedule};

// Proc macros (feature-gated)
#[cfg(feature = "macros")]
pub use update_coalescer_macros::Patch;
