// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! The worker-pool executor: lifecycle state machine, worker bookkeeping,
//! task dispatch, and rejection handling.

mod config;
mod pool;
mod rejection;
mod state;
mod worker;

pub use config::{
    ContextCarrier, ContextCarrierFactory, DefaultThreadFactory, ThreadFactory,
    ThreadPoolExecutorBuilder,
};
pub use pool::ThreadPoolExecutor;
pub use rejection::RejectionPolicy;
pub use state::RunState;

use crate::error::Result;

/// A boxed unit of work with no return value — the unit the executor
/// actually queues and dispatches. `submit`'s `Future`-returning API wraps
/// a [`crate::task::FutureTask`] into one of these.
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// The executor surface every worker pool in this crate implements.
pub trait Executor: Send + Sync {
    /// Submits `task` for execution with no result tracking. Fails with
    /// [`crate::error::ThreadPoolError::Rejected`] (or whatever the
    /// configured [`RejectionPolicy`] does) if the executor cannot accept
    /// it.
    fn execute(&self, task: Runnable) -> Result<()>;
}
