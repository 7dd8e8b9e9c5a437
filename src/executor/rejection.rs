// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! Rejection policies: what happens when `execute`/`submit` cannot accept a
//! task because the pool is shut down or saturated.

use super::pool::ThreadPoolExecutor;
use super::Runnable;
use crate::error::{Result, ThreadPoolError};
use crate::queue::BlockingQueue;

/// A closed sum type covering the four standard policies, plus a `Custom`
/// escape hatch for user-defined handling. Closed-over variants avoid a
/// vtable for the common cases while still allowing full customization.
pub enum RejectionPolicy {
    /// Raises [`ThreadPoolError::Rejected`].
    Abort,
    /// Runs the task on the submitting thread, unless the executor has
    /// already shut down (in which case it is silently discarded).
    CallerRuns,
    /// Drops the task silently.
    Discard,
    /// Evicts the head of the work queue, then retries submission once.
    DiscardOldest,
    /// A user-supplied handler.
    Custom(Box<dyn Fn(Runnable, &ThreadPoolExecutor) -> Result<()> + Send + Sync>),
}

impl RejectionPolicy {
    pub(crate) fn reject(&self, task: Runnable, executor: &ThreadPoolExecutor) -> Result<()> {
        match self {
            RejectionPolicy::Abort => Err(ThreadPoolError::Rejected),
            RejectionPolicy::CallerRuns => {
                if executor.is_shutdown() {
                    Ok(())
                } else {
                    task();
                    Ok(())
                }
            }
            RejectionPolicy::Discard => Ok(()),
            RejectionPolicy::DiscardOldest => {
                if !executor.is_shutdown() {
                    let _ = executor.work_queue().poll();
                }
                executor.execute(task)
            }
            RejectionPolicy::Custom(handler) => handler(task, executor),
        }
    }
}

impl std::fmt::Debug for RejectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RejectionPolicy::Abort => "Abort",
            RejectionPolicy::CallerRuns => "CallerRuns",
            RejectionPolicy::Discard => "Discard",
            RejectionPolicy::DiscardOldest => "DiscardOldest",
            RejectionPolicy::Custom(_) => "Custom",
        };
        f.debug_tuple("RejectionPolicy").field(&name).finish()
    }
}
