// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`ThreadPoolExecutor`] — the worker-pool executor itself: submission
//! decision, lifecycle transitions, and observability.

use super::config::{ContextCarrier, ContextCarrierFactory, ThreadFactory};
use super::rejection::RejectionPolicy;
use super::state::{ControlWord, RunState};
use super::worker::{self, WorkerHandle};
use super::{Executor, Runnable};
use crate::error::{Result, ThreadPoolError};
use crate::queue::{BlockingQueue, LinkedBlockingQueue};
use crate::task::FutureTask;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

struct WorkerEntry {
    handle: Arc<WorkerHandle>,
    thread: Option<JoinHandle<()>>,
}

/// State guarded by the executor's single main lock: the live worker set
/// and the pool's running statistics. The control word (run-state +
/// worker count) is deliberately *not* behind this lock — it's CAS-updated
/// so submission and the dispatch loop never block on it.
struct Bookkeeping {
    workers: Vec<WorkerEntry>,
    largest_pool_size: u32,
    completed_task_count: u64,
    task_count: u64,
}

pub(crate) struct Inner {
    pub(crate) control: ControlWord,
    pub(crate) core_size: AtomicU32,
    max_size: AtomicU32,
    keep_alive: Mutex<Duration>,
    pub(crate) allow_core_timeout: AtomicBool,
    pub(crate) work_queue: Arc<LinkedBlockingQueue<Runnable>>,
    thread_factory: Mutex<Arc<dyn ThreadFactory>>,
    rejection_policy: Mutex<RejectionPolicy>,
    context_carrier_factory: Option<Arc<dyn ContextCarrierFactory>>,
    bookkeeping: Mutex<Bookkeeping>,
    termination: Condvar,
    next_worker_id: AtomicU64,
    on_thread_exception: Arc<LinkedBlockingQueue<ThreadPoolError>>,
}

impl Inner {
    pub(crate) fn keep_alive(&self) -> Duration {
        *self
            .keep_alive
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub(crate) fn before_execute(&self, _worker_id: u64) {}

    pub(crate) fn after_execute_success(&self, _worker_id: u64) {}

    pub(crate) fn after_execute_failure(&self, _worker_id: u64, failure: ThreadPoolError) {
        let _ = self.on_thread_exception.offer(failure);
    }

    /// Removes the exiting worker from bookkeeping and decrements the
    /// control word's worker count — the single point every exit path
    /// (timeout, interrupt, shutdown, queue-broken) funnels through, mirroring
    /// `java.util.concurrent.ThreadPoolExecutor.processWorkerExit`.
    pub(crate) fn worker_exited(&self, worker_id: u64) {
        {
            let mut book = self.lock_book();
            if let Some(pos) = book.workers.iter().position(|w| w.handle.id == worker_id) {
                let entry = book.workers.remove(pos);
                book.completed_task_count += entry.handle.completed_tasks.load(Ordering::Relaxed);
            }
        }
        self.control.decrement_worker_count();
        self.try_terminate();
    }

    fn lock_book(&self) -> std::sync::MutexGuard<'_, Bookkeeping> {
        self.bookkeeping
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Reserves a worker-count slot via CAS without touching any task. The
    /// caller either fills that slot by spawning a thread, or abandons the
    /// reservation by decrementing again.
    fn try_reserve_slot(&self, limit: RunState) -> bool {
        self.control.try_increment_worker_count(limit)
    }

    /// Spawns the OS thread for a slot already reserved by
    /// [`Inner::try_reserve_slot`]. If thread creation itself fails (an OS
    /// resource error, not a capacity check), the reservation is rolled
    /// back and `first_task`, if any, is dropped — there is no slot left to
    /// run it on.
    ///
    /// Takes `inner` as an explicit `&Arc<Inner>` (rather than as a method
    /// receiver) purely so it can clone an owned handle to move into the
    /// spawned thread's closure.
    fn spawn_worker_with_slot(inner: &Arc<Inner>, first_task: Option<Runnable>) {
        let id = inner.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let handle = WorkerHandle::new(id);
        let inner_for_thread = inner.clone();
        let handle_for_thread = handle.clone();
        let factory = inner
            .thread_factory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        let join = factory.new_thread(Box::new(move || {
            worker::run(inner_for_thread, handle_for_thread, first_task);
        }));

        let Some(join) = join else {
            tracing::error!("thread factory failed to create worker thread; task lost");
            inner.control.decrement_worker_count();
            return;
        };

        let mut book = inner.lock_book();
        book.workers.push(WorkerEntry {
            handle,
            thread: Some(join),
        });
        book.largest_pool_size = book.largest_pool_size.max(book.workers.len() as u32);
    }

    /// Attempts to advance to `TIDYING`/`TERMINATED` if eligible; a no-op
    /// otherwise.
    pub(crate) fn try_terminate(&self) {
        let state = self.control.run_state();
        if state == RunState::Running {
            return;
        }
        let worker_count = self.control.worker_count();
        let queue_empty = self.work_queue.len() == 0;

        let eligible = (state == RunState::Shutdown && queue_empty && worker_count == 0)
            || (state == RunState::Stop && worker_count == 0);

        if !eligible {
            if worker_count > 0 {
                self.interrupt_one_idle_worker();
            }
            return;
        }

        self.control.advance_to(RunState::Tidying);
        tracing::info!("executor tidying");
        self.control.advance_to(RunState::Terminated);
        tracing::info!("executor terminated");
        let _book = self.lock_book();
        self.termination.notify_all();
    }

    fn interrupt_one_idle_worker(&self) {
        let book = self.lock_book();
        if let Some(entry) = book.workers.iter().find(|w| w.handle.is_idle()) {
            entry.handle.interrupt();
        }
    }

    fn interrupt_idle_workers(&self) {
        let book = self.lock_book();
        for entry in &book.workers {
            if entry.handle.is_idle() {
                entry.handle.interrupt();
            }
        }
    }
}

/// A configurable worker-thread pool: accepts tasks via [`Executor::execute`]
/// or [`ThreadPoolExecutor::submit`], enqueues them on a [`LinkedBlockingQueue`],
/// grows/shrinks workers under configured bounds, and supports the four
/// standard [`RejectionPolicy`] variants plus a custom escape hatch.
pub struct ThreadPoolExecutor {
    inner: Arc<Inner>,
}

impl ThreadPoolExecutor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_builder(
        core_size: u32,
        max_size: u32,
        keep_alive: Duration,
        allow_core_timeout: bool,
        work_queue: Arc<LinkedBlockingQueue<Runnable>>,
        thread_factory: Arc<dyn ThreadFactory>,
        rejection_policy: RejectionPolicy,
        context_carrier_factory: Option<Arc<dyn ContextCarrierFactory>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                control: ControlWord::new(),
                core_size: AtomicU32::new(core_size),
                max_size: AtomicU32::new(max_size),
                keep_alive: Mutex::new(keep_alive),
                allow_core_timeout: AtomicBool::new(allow_core_timeout),
                work_queue,
                thread_factory: Mutex::new(thread_factory),
                rejection_policy: Mutex::new(rejection_policy),
                context_carrier_factory,
                bookkeeping: Mutex::new(Bookkeeping {
                    workers: Vec::new(),
                    largest_pool_size: 0,
                    completed_task_count: 0,
                    task_count: 0,
                }),
                termination: Condvar::new(),
                next_worker_id: AtomicU64::new(0),
                on_thread_exception: Arc::new(LinkedBlockingQueue::new()),
            }),
        }
    }

    /// Submits `work`, returning a [`FutureTask`] the caller can poll or
    /// block on via [`FutureTask::get`].
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::Rejected`] (or whatever the configured
    /// [`RejectionPolicy`] does) if the executor cannot accept the task.
    pub fn submit<T, F>(&self, work: F) -> Result<Arc<FutureTask<T>>>
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
    {
        let task = Arc::new(FutureTask::new(work));
        let runnable_task = task.clone();
        self.execute(Box::new(move || runnable_task.run()))?;
        Ok(task)
    }

    /// The three-step submission decision: prefer growing below
    /// `core_size`, then prefer queueing, and only then grow above
    /// `core_size` (bounded by `max_size`); falling back to the configured
    /// [`RejectionPolicy`] only once none of those succeed.
    fn submit_runnable(&self, task: Runnable) -> Result<()> {
        let inner = &self.inner;
        inner.lock_book().task_count += 1;

        // Snapshot ambient context at submit time (this thread), restored by
        // whichever worker thread actually runs the task, immediately before
        // it runs.
        let task: Runnable = match &inner.context_carrier_factory {
            Some(factory) => {
                let carrier = factory.create();
                Box::new(move || {
                    carrier.restore();
                    task();
                })
            }
            None => task,
        };

        let core_size = inner.core_size.load(Ordering::SeqCst);
        if inner.control.worker_count() < core_size && inner.try_reserve_slot(RunState::Running) {
            Inner::spawn_worker_with_slot(inner, Some(task));
            return Ok(());
        }

        if inner.control.is_running() && inner.work_queue.remaining_capacity() > 0 {
            return match inner.work_queue.offer(task) {
                Ok(true) => {
                    if inner.control.worker_count() == 0
                        && inner.try_reserve_slot(RunState::Running)
                    {
                        Inner::spawn_worker_with_slot(inner, None);
                    }
                    Ok(())
                }
                // A race against a concurrent shutdown or a filled queue:
                // the task was already moved into `offer`, so there is no
                // way to recover it for the next step. Reported as
                // rejected rather than silently dropped.
                Ok(false) | Err(_) => Err(ThreadPoolError::Rejected),
            };
        }

        let max_size = inner.max_size.load(Ordering::SeqCst);
        if inner.control.worker_count() < max_size && inner.try_reserve_slot(RunState::Running) {
            Inner::spawn_worker_with_slot(inner, Some(task));
            return Ok(());
        }

        self.reject(task)
    }

    /// Runs the configured policy against a rejected `task`.
    ///
    /// `CallerRuns` and `DiscardOldest` call back into this executor
    /// (running the task inline, or re-entering `execute`), so the policy
    /// is lifted out of its mutex for the duration of the call rather than
    /// invoked under lock — otherwise a `DiscardOldest` retry that lands
    /// back here would deadlock against its own mutex.
    fn reject(&self, task: Runnable) -> Result<()> {
        let policy = std::mem::replace(
            &mut *self
                .inner
                .rejection_policy
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
            RejectionPolicy::Abort,
        );
        let result = policy.reject(task, self);
        *self
            .inner
            .rejection_policy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = policy;
        result
    }

    /// Read-only handle to the work queue (for observability and the
    /// `discard_oldest` rejection policy).
    pub(crate) fn work_queue(&self) -> &LinkedBlockingQueue<Runnable> {
        &self.inner.work_queue
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.control.run_state() >= RunState::Shutdown
    }

    pub fn is_terminating(&self) -> bool {
        matches!(
            self.inner.control.run_state(),
            RunState::Shutdown | RunState::Stop
        )
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.control.run_state() == RunState::Terminated
    }

    /// Initiates an orderly shutdown: previously submitted tasks still run,
    /// but no new tasks are accepted. Interrupts currently-idle workers so
    /// they notice the new state and exit once the queue drains.
    pub fn shutdown(&self) {
        self.inner.control.advance_to(RunState::Shutdown);
        tracing::info!("executor shutdown initiated");
        self.inner.interrupt_idle_workers();
        self.inner.try_terminate();
    }

    /// Stops processing waiting tasks immediately, interrupts every worker
    /// (idle or not — running tasks only actually stop if they observe the
    /// simulated interrupt), and returns the tasks that were still queued.
    pub fn shutdown_now(&self) -> Vec<Runnable> {
        self.inner.control.advance_to(RunState::Stop);
        tracing::info!("executor shutdown_now initiated");
        {
            let book = self.inner.lock_book();
            for entry in &book.workers {
                entry.handle.interrupt();
            }
        }
        let mut drained = Vec::new();
        while let Ok(Some(task)) = self.inner.work_queue.poll() {
            drained.push(task);
        }
        self.inner.try_terminate();
        drained
    }

    /// Blocks up to `timeout` for the executor to reach `TERMINATED`.
    /// Returns whether it did.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut book = self.inner.lock_book();
        loop {
            if self.is_terminated() {
                return true;
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _timed_out) = self
                .inner
                .termination
                .wait_timeout(book, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            book = guard;
        }
    }

    // --- Mutable configuration ---------------------------------------

    pub fn set_core_size(&self, core_size: u32) {
        let previous = self.inner.core_size.swap(core_size, Ordering::SeqCst);
        if core_size < previous {
            self.inner.interrupt_idle_workers();
        } else if core_size > previous {
            for _ in previous..core_size {
                if self.inner.control.worker_count() >= core_size {
                    break;
                }
                if !self.inner.try_reserve_slot(RunState::Running) {
                    break;
                }
                Inner::spawn_worker_with_slot(&self.inner, None);
            }
        }
    }

    pub fn set_max_size(&self, max_size: u32) {
        let previous = self.inner.max_size.swap(max_size, Ordering::SeqCst);
        if max_size < previous {
            self.inner.interrupt_idle_workers();
        }
    }

    pub fn set_keep_alive(&self, keep_alive: Duration) {
        *self
            .inner
            .keep_alive
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = keep_alive;
    }

    pub fn set_allow_core_timeout(&self, allow: bool) {
        self.inner
            .allow_core_timeout
            .store(allow, Ordering::SeqCst);
    }

    pub fn set_rejection_policy(&self, policy: RejectionPolicy) {
        *self
            .inner
            .rejection_policy
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = policy;
    }

    pub fn set_thread_factory(&self, factory: Arc<dyn ThreadFactory>) {
        *self
            .inner
            .thread_factory
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = factory;
    }

    // --- Observability --------------------------------------------------

    pub fn pool_size(&self) -> u32 {
        self.inner.control.worker_count()
    }

    pub fn active_count(&self) -> u32 {
        let book = self.inner.lock_book();
        book.workers
            .iter()
            .filter(|w| !w.handle.is_idle())
            .count() as u32
    }

    pub fn largest_pool_size(&self) -> u32 {
        self.inner.lock_book().largest_pool_size
    }

    pub fn task_count(&self) -> u64 {
        self.inner.lock_book().task_count
    }

    pub fn completed_task_count(&self) -> u64 {
        let book = self.inner.lock_book();
        book.completed_task_count
            + book
                .workers
                .iter()
                .map(|w| w.handle.completed_tasks.load(Ordering::Relaxed))
                .sum::<u64>()
    }

    /// Queue of failures raised in the dispatch loop (task panics, hook
    /// errors); drain it to observe worker-thread exceptions without a
    /// synchronous callback held under any lock.
    pub fn on_thread_exception(&self) -> Arc<LinkedBlockingQueue<ThreadPoolError>> {
        self.inner.on_thread_exception.clone()
    }
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, task: Runnable) -> Result<()> {
        self.submit_runnable(task)
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        let mut book = self.inner.lock_book();
        for entry in &mut book.workers {
            // Detach rather than join: dropping the executor must not block
            // the caller on worker threads that may be parked indefinitely.
            drop(entry.thread.take());
        }
    }
}
