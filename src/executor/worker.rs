// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! A single worker's bookkeeping record and its dispatch loop.
//!
//! A worker is "idle" iff nothing currently holds its `busy` lock — the
//! reaper (shutdown / dynamic reconfiguration) identifies idle workers with
//! a non-blocking `try_lock` rather than a separate flag, so there is no
//! window where the flag and the lock disagree.

use super::pool::Inner;
use super::Runnable;
use crate::error::ThreadPoolError;
use crate::queue::BlockingQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How long `get_task`'s indefinite-wait loop sleeps between checks of the
/// interrupt flag and run-state. This is the crate's simulated-interrupt
/// granularity: a worker parked indefinitely notices a shutdown or a
/// targeted interrupt within one tick, not instantly.
const POLL_TICK: Duration = Duration::from_millis(25);

pub struct WorkerHandle {
    pub id: u64,
    pub busy: Mutex<()>,
    pub interrupted: AtomicBool,
    pub completed_tasks: AtomicU64,
}

impl WorkerHandle {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            busy: Mutex::new(()),
            interrupted: AtomicBool::new(false),
            completed_tasks: AtomicU64::new(0),
        })
    }

    /// `true` iff nothing currently holds `busy` — i.e. the worker is
    /// between tasks.
    pub fn is_idle(&self) -> bool {
        self.busy.try_lock().is_ok()
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

/// Runs on the spawned OS thread: executes `first_task` (if any), then
/// repeatedly pulls from the work queue until `get_task` returns `None`,
/// at which point the worker removes itself from the pool and exits.
pub fn run(inner: Arc<Inner>, handle: Arc<WorkerHandle>, first_task: Option<Runnable>) {
    tracing::debug!(worker_id = handle.id, "worker starting");
    let mut task = first_task;
    loop {
        let Some(runnable) = task.take().or_else(|| get_task(&inner, &handle)) else {
            break;
        };

        let _busy = handle
            .busy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        inner.before_execute(handle.id);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(runnable));
        if let Err(payload) = result {
            let panic = crate::error::TaskPanic::from_payload(payload.as_ref());
            tracing::warn!(worker_id = handle.id, %panic, "task panicked");
            inner.after_execute_failure(handle.id, ThreadPoolError::execution(panic));
        } else {
            inner.after_execute_success(handle.id);
        }
        handle.completed_tasks.fetch_add(1, Ordering::Relaxed);
    }

    tracing::debug!(worker_id = handle.id, "worker exiting");
    inner.worker_exited(handle.id);
}

/// Decides between an indefinite (tick-polled) wait and a timed wait based
/// on whether this worker is above `core_size` or `allow_core_timeout` is
/// set.
fn get_task(inner: &Arc<Inner>, handle: &WorkerHandle) -> Option<Runnable> {
    loop {
        if handle.interrupted.load(Ordering::SeqCst) {
            return None;
        }
        if inner.control.run_state() >= super::RunState::Stop {
            return None;
        }

        let core_size = inner.core_size.load(Ordering::SeqCst);
        let timed = inner.control.worker_count() > core_size
            || inner.allow_core_timeout.load(Ordering::SeqCst);

        let deadline = timed.then(|| Instant::now() + inner.keep_alive());

        match inner.work_queue.poll_timeout(POLL_TICK) {
            Ok(Some(task)) => return Some(task),
            Ok(None) => {
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return None;
                    }
                }
                continue;
            }
            Err(_) => return None,
        }
    }
}
