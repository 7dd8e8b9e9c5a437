// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`FutureTask`] — a one-shot cancellable computation carrying a result or
//! a failure, with [`FutureTask::get`] synchronizing completion with any
//! number of waiters.
//!
//! # Simulated interruption
//!
//! Safe Rust has no native "thread interrupt". Each `FutureTask` carries an
//! [`AtomicBool`] interrupt flag; [`cancel(true)`](FutureTask::cancel) sets
//! it and wakes the done condition, and the worker loop (see
//! [`crate::executor`]) checks the flag at its own suspension points and
//! translates it into [`ThreadPoolError::Interrupted`].

use crate::error::{Result, ThreadPoolError};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const NEW: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETING: u8 = 2;
const NORMAL: u8 = 3;
const EXCEPTIONAL: u8 = 4;
const CANCELLED: u8 = 5;
const INTERRUPTING: u8 = 6;
const INTERRUPTED: u8 = 7;

fn is_terminal(state: u8) -> bool {
    matches!(state, NORMAL | EXCEPTIONAL | CANCELLED | INTERRUPTED)
}

enum Outcome<T> {
    Value(T),
    Failure(ThreadPoolError),
}

/// A one-shot, cancellable unit of work producing `T`.
///
/// `T` must be [`Clone`] because [`get`](Self::get) may be called more than
/// once (by multiple waiters, or the same caller retrying after a timeout)
/// and each call must observe the same committed outcome.
pub struct FutureTask<T: Clone + Send + 'static> {
    state: AtomicU8,
    outcome: Mutex<Option<Outcome<T>>>,
    done_cond: Condvar,
    work: Mutex<Option<Box<dyn FnOnce() -> std::result::Result<T, ThreadPoolError> + Send>>>,
    done_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    interrupted: std::sync::atomic::AtomicBool,
}

impl<T: Clone + Send + 'static> FutureTask<T> {
    /// Wraps `work` as a not-yet-started task.
    pub fn new<F>(work: F) -> Self
    where
        F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
    {
        Self {
            state: AtomicU8::new(NEW),
            outcome: Mutex::new(None),
            done_cond: Condvar::new(),
            work: Mutex::new(Some(Box::new(work))),
            done_hook: Mutex::new(None),
            interrupted: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Registers a hook invoked exactly once, after the outcome is
    /// committed but before any blocked `get` unblocks. Used by the
    /// completion service to push `self` onto its completed-task queue.
    pub fn set_done_hook(&self, hook: impl FnOnce() + Send + 'static) {
        *self.done_hook.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Box::new(hook));
    }

    /// Runs the wrapped work exactly once. Subsequent calls (including
    /// concurrent ones that lose the `NEW -> RUNNING` CAS) are no-ops.
    pub fn run(&self) {
        if self
            .state
            .compare_exchange(NEW, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let work = self.work.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        let Some(work) = work else { return };

        if self.interrupted.load(Ordering::SeqCst) {
            self.finish(Outcome::Failure(ThreadPoolError::Interrupted), EXCEPTIONAL);
            return;
        }

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
        match result {
            Ok(Ok(value)) => self.finish(Outcome::Value(value), NORMAL),
            Ok(Err(failure)) => self.finish(Outcome::Failure(failure), EXCEPTIONAL),
            Err(payload) => {
                let panic = crate::error::TaskPanic::from_payload(payload.as_ref());
                self.finish(
                    Outcome::Failure(ThreadPoolError::execution(panic)),
                    EXCEPTIONAL,
                );
            }
        }
    }

    fn finish(&self, outcome: Outcome<T>, terminal_state: u8) {
        // A concurrent `cancel` may have already moved the state past
        // `RUNNING` (to `INTERRUPTING`/`CANCELLED`/`INTERRUPTED`) while the
        // user work was still running. In that case cancellation wins: bail
        // without storing an outcome or firing the done hook a second time,
        // rather than resurrecting a task whose terminal state is supposed
        // to be frozen.
        if self
            .state
            .compare_exchange(RUNNING, COMPLETING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        *self.outcome.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(outcome);
        self.state.store(terminal_state, Ordering::SeqCst);
        self.fire_done_hook();
        self.done_cond.notify_all();
    }

    /// Invokes the registered done hook at most once; both [`finish`](Self::finish)
    /// and [`cancel`](Self::cancel) route through this so a task's hook runs
    /// exactly once regardless of which path reaches a terminal state first.
    fn fire_done_hook(&self) {
        if let Some(hook) = self
            .done_hook
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
        {
            hook();
        }
    }

    /// Attempts to cancel the task. Succeeds only while the state is `NEW`
    /// or `RUNNING`. If `interrupt` is true and the task is running, the
    /// interrupt flag is set for the worker loop to observe; the state
    /// moves through `INTERRUPTING` to `INTERRUPTED`. Otherwise it moves
    /// directly to `CANCELLED`. Idempotent: once cancelled, always
    /// cancelled.
    pub fn cancel(&self, interrupt: bool) -> bool {
        loop {
            let current = self.state.load(Ordering::SeqCst);
            if current != NEW && current != RUNNING {
                return false;
            }
            let target = if interrupt && current == RUNNING {
                INTERRUPTING
            } else {
                CANCELLED
            };
            if self
                .state
                .compare_exchange(current, target, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        if interrupt {
            self.interrupted.store(true, Ordering::SeqCst);
            // Move INTERRUPTING -> INTERRUPTED once the interrupt signal
            // has been posted; a still-NEW task that raced through
            // CANCELLED above skips this.
            let _ = self.state.compare_exchange(
                INTERRUPTING,
                INTERRUPTED,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
        }

        self.fire_done_hook();
        self.done_cond.notify_all();
        true
    }

    /// `true` once the interrupt flag has been set by [`cancel(true)`](Self::cancel).
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// `true` iff the state is any terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        is_terminal(self.state.load(Ordering::SeqCst))
    }

    /// `true` iff the task was cancelled (with or without interrupt).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self.state.load(Ordering::SeqCst),
            CANCELLED | INTERRUPTING | INTERRUPTED
        )
    }

    /// Blocks indefinitely until terminal, then returns the outcome.
    pub fn get(&self) -> Result<T> {
        let mut outcome = self
            .outcome
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if is_terminal(self.state.load(Ordering::SeqCst)) {
                return self.read_outcome(&outcome);
            }
            outcome = self
                .done_cond
                .wait(outcome)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    /// Blocks until terminal or `timeout` elapses, whichever comes first.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self
            .outcome
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if is_terminal(self.state.load(Ordering::SeqCst)) {
                return self.read_outcome(&outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ThreadPoolError::Timeout);
            }
            let (guard, _timed_out) = self
                .done_cond
                .wait_timeout(outcome, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            outcome = guard;
        }
    }

    fn read_outcome(&self, outcome: &Option<Outcome<T>>) -> Result<T> {
        match self.state.load(Ordering::SeqCst) {
            NORMAL => match outcome {
                Some(Outcome::Value(v)) => Ok(v.clone()),
                _ => unreachable!("NORMAL state without a stored value"),
            },
            EXCEPTIONAL => match outcome {
                Some(Outcome::Failure(e)) => Err(clone_error(e)),
                _ => unreachable!("EXCEPTIONAL state without a stored failure"),
            },
            CANCELLED | INTERRUPTING | INTERRUPTED => Err(ThreadPoolError::Cancelled),
            _ => unreachable!("read_outcome called on a non-terminal state"),
        }
    }
}

fn clone_error(e: &ThreadPoolError) -> ThreadPoolError {
    match e {
        ThreadPoolError::Execution(inner) => {
            ThreadPoolError::execution(crate::error::TaskPanic::new(inner.to_string()))
        }
        ThreadPoolError::Interrupted => ThreadPoolError::Interrupted,
        ThreadPoolError::Timeout => ThreadPoolError::Timeout,
        ThreadPoolError::QueueBroken => ThreadPoolError::QueueBroken,
        ThreadPoolError::Rejected => ThreadPoolError::Rejected,
        ThreadPoolError::Cancelled => ThreadPoolError::Cancelled,
        ThreadPoolError::Poisoned { context } => ThreadPoolError::Poisoned { context },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn run_is_idempotent() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls2 = calls.clone();
        let task = FutureTask::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        task.run();
        task.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(task.get().unwrap(), 7);
    }

    #[test]
    fn cancel_before_run_is_idempotent() {
        let task: FutureTask<i32> = FutureTask::new(|| Ok(1));
        assert!(task.cancel(false));
        assert!(!task.cancel(false));
        assert!(task.is_cancelled());
        assert!(matches!(task.get(), Err(ThreadPoolError::Cancelled)));
    }

    #[test]
    fn failed_task_surfaces_execution_error() {
        let task: FutureTask<i32> = FutureTask::new(|| Err(ThreadPoolError::execution(crate::error::TaskPanic::new("boom"))));
        task.run();
        assert!(task.is_done());
        assert!(matches!(task.get(), Err(ThreadPoolError::Execution(_))));
    }

    #[test]
    fn get_timeout_elapses_before_run() {
        let task: FutureTask<i32> = FutureTask::new(|| Ok(1));
        let result = task.get_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(ThreadPoolError::Timeout)));
    }

    #[test]
    fn cancel_fires_done_hook() {
        let hook_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hook_ran2 = hook_ran.clone();
        let task: FutureTask<i32> = FutureTask::new(|| Ok(1));
        task.set_done_hook(move || hook_ran2.store(true, Ordering::SeqCst));
        assert!(task.cancel(false));
        assert!(hook_ran.load(Ordering::SeqCst));
        assert!(matches!(task.get(), Err(ThreadPoolError::Cancelled)));
    }

    #[test]
    fn finish_cannot_resurrect_a_cancelled_task() {
        let task: FutureTask<i32> = FutureTask::new(|| Ok(1));
        task.state.store(RUNNING, Ordering::SeqCst);
        assert!(task.cancel(true));
        assert_eq!(task.state.load(Ordering::SeqCst), INTERRUPTED);

        // Simulate a user closure that was already past its interrupt
        // check and tries to commit a normal result after `cancel` won.
        task.finish(Outcome::Value(42), NORMAL);

        assert_eq!(task.state.load(Ordering::SeqCst), INTERRUPTED);
        assert!(matches!(task.get(), Err(ThreadPoolError::Cancelled)));
    }

    #[test]
    fn done_hook_runs_once_before_waiters_unblock() {
        let hook_ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hook_ran2 = hook_ran.clone();
        let task: Arc<FutureTask<i32>> = Arc::new(FutureTask::new(|| Ok(5)));
        task.set_done_hook(move || hook_ran2.store(true, Ordering::SeqCst));
        task.run();
        assert!(hook_ran.load(Ordering::SeqCst));
        assert_eq!(task.get().unwrap(), 5);
    }
}
