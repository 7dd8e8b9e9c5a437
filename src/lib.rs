// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! General-purpose concurrency primitives for `std::thread`-based Rust:
//!
//! - [`queue`] — a family of thread-safe blocking queues
//!   ([`LinkedBlockingQueue`], [`ArrayBlockingQueue`], [`PriorityBlockingQueue`],
//!   [`DelayQueue`], [`BlockingQueueWrapper`]).
//! - [`task`] — [`FutureTask`], a one-shot cancellable computation.
//! - [`executor`] — [`ThreadPoolExecutor`], a configurable worker pool with
//!   rejection policies and dynamic reconfiguration.
//! - [`completion`] — [`ExecutorCompletionService`], completion-order task
//!   retrieval.
//! - [`bulk`] — [`invoke_any`], [`invoke_all`], [`invoke_all_or_fail`].
//!
//! None of this crate's blocking operations use native thread interrupts
//! (safe Rust has none); see the module docs on [`task::FutureTask`] for the
//! simulated-interrupt convention every suspension point in this crate
//! follows — an `AtomicBool` flag plus a `Condvar` wake-up, checked at every
//! blocking call.

pub mod bulk;
pub mod completion;
pub mod error;
pub mod executor;
pub mod queue;
pub mod task;

pub use completion::ExecutorCompletionService;
pub use error::{Result, ThreadPoolError};
pub use executor::{Executor, RejectionPolicy, ThreadPoolExecutor, ThreadPoolExecutorBuilder};
pub use queue::{
    ArrayBlockingQueue, BlockingQueue, BlockingQueueWrapper, DelayQueue, Delayed,
    LinkedBlockingQueue, PriorityBlockingQueue,
};
pub use task::FutureTask;
