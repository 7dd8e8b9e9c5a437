// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! The crate-wide error type. See [`ThreadPoolError`].

use std::fmt;

/// Errors produced by this crate's queues, futures, and executors.
///
/// Each variant is one of the error *kinds* a caller needs to distinguish:
/// rejection at submission time, interruption of a blocking call, a
/// cancelled or failed task observed through [`get`], a deadline elapsing,
/// or a queue that has been permanently [`break`]-ed.
///
/// Non-blocking `offer` on a full bounded queue is deliberately *not* a
/// variant here — it returns `Ok(false)`, since running out of capacity is
/// an expected outcome, not a failure.
///
/// [`break`]: crate::queue::LinkedBlockingQueue::close
/// [`get`]: crate::task::FutureTask::get
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ThreadPoolError {
    /// `execute`/`submit` was refused because the executor is shutting down
    /// or saturated and the configured [`RejectionPolicy`] raised instead of
    /// absorbing the task.
    ///
    /// [`RejectionPolicy`]: crate::executor::RejectionPolicy
    #[error("task rejected by executor")]
    #[diagnostic(
        code(taskpool::rejected),
        help("the executor is shut down, or its queue and worker ceiling are both saturated")
    )]
    Rejected,

    /// A blocking call (`put`, `take`, `get`, `await_termination`, ...) was
    /// cancelled by a simulated thread interrupt before it could complete.
    #[error("operation interrupted")]
    #[diagnostic(code(taskpool::interrupted))]
    Interrupted,

    /// [`FutureTask::get`] observed a cancelled task.
    ///
    /// [`FutureTask::get`]: crate::task::FutureTask::get
    #[error("task was cancelled")]
    #[diagnostic(code(taskpool::cancelled))]
    Cancelled,

    /// [`FutureTask::get`] observed a task whose user work failed. The
    /// original failure is preserved behind this variant.
    ///
    /// [`FutureTask::get`]: crate::task::FutureTask::get
    #[error("task failed: {0}")]
    #[diagnostic(code(taskpool::execution))]
    Execution(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A deadline-bounded operation elapsed before it could complete.
    #[error("operation timed out")]
    #[diagnostic(code(taskpool::timeout))]
    Timeout,

    /// A producer called `put`/`offer` (or a consumer called `take`/`poll`
    /// on an empty queue) after the queue was permanently closed via
    /// `close()`.
    #[error("queue is broken")]
    #[diagnostic(code(taskpool::queue_broken))]
    QueueBroken,

    /// An internal `Mutex` was poisoned by a prior thread panicking while
    /// holding it. Unlike the kinds above, this is not part of the
    /// documented error taxonomy the original design enumerates — it exists
    /// because this implementation uses `std::sync::Mutex`, which can be
    /// poisoned, and the crate must surface that rather than panicking.
    #[error("internal lock poisoned: {context}")]
    #[diagnostic(
        code(taskpool::poisoned),
        help("a prior thread panicked while holding this executor's lock; the pool should be discarded")
    )]
    Poisoned {
        /// Which lock was poisoned, for diagnostics.
        context: &'static str,
    },
}

impl ThreadPoolError {
    pub(crate) fn poisoned(context: &'static str) -> Self {
        ThreadPoolError::Poisoned { context }
    }

    /// Wraps an arbitrary user failure as an [`Execution`] error.
    ///
    /// [`Execution`]: Self::Execution
    pub fn execution<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ThreadPoolError::Execution(Box::new(err))
    }
}

/// A simple string-backed error used to wrap panics caught from user task
/// closures, where the payload does not implement [`std::error::Error`].
#[derive(Debug)]
pub struct TaskPanic {
    message: String,
}

impl TaskPanic {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Renders a caught panic payload (from [`std::panic::catch_unwind`])
    /// into a displayable message.
    #[must_use]
    pub fn from_payload(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "task panicked with a non-string payload".to_string()
        };
        Self::new(message)
    }
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TaskPanic {}

pub type Result<T> = std::result::Result<T, ThreadPoolError>;
