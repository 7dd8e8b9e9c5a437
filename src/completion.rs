// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`ExecutorCompletionService`] — submits tasks to an [`Executor`] and
//! hands completed ones back in completion order rather than submission
//! order.

use crate::error::Result;
use crate::executor::Executor;
use crate::queue::{BlockingQueue, LinkedBlockingQueue};
use crate::task::FutureTask;
use std::sync::Arc;
use std::time::Duration;

/// Wraps an [`Executor`] so that [`take`](Self::take)/[`poll`](Self::poll)
/// return tasks in the order they *finish*, not the order they were
/// submitted — useful for "process whichever finishes first" fan-out.
///
/// Completion order is established with [`FutureTask::set_done_hook`]: each
/// submitted task pushes itself onto an internal completion queue the
/// instant its outcome is committed, before any external waiter on that
/// same task unblocks.
pub struct ExecutorCompletionService<'a, T: Clone + Send + 'static> {
    executor: &'a dyn Executor,
    completed: Arc<LinkedBlockingQueue<Arc<FutureTask<T>>>>,
}

impl<'a, T: Clone + Send + 'static> ExecutorCompletionService<'a, T> {
    #[must_use]
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self {
            executor,
            completed: Arc::new(LinkedBlockingQueue::new()),
        }
    }

    /// Submits `work` to the underlying executor. The returned
    /// [`FutureTask`] is also what [`take`](Self::take)/[`poll`](Self::poll)
    /// will eventually return once it completes.
    ///
    /// # Errors
    ///
    /// Propagates rejection from the underlying executor.
    pub fn submit<F>(&self, work: F) -> Result<Arc<FutureTask<T>>>
    where
        F: FnOnce() -> std::result::Result<T, crate::error::ThreadPoolError> + Send + 'static,
    {
        let task = Arc::new(FutureTask::new(work));
        let hook_task = task.clone();
        let completed = self.completed.clone();
        task.set_done_hook(move || {
            let _ = completed.offer(hook_task);
        });
        let runnable_task = task.clone();
        self.executor.execute(Box::new(move || runnable_task.run()))?;
        Ok(task)
    }

    /// Blocks until a submitted task completes, returning it in completion
    /// order.
    pub fn take(&self) -> Result<Arc<FutureTask<T>>> {
        self.completed.take()
    }

    /// Returns the next completed task without blocking, or `None` if none
    /// has finished yet.
    pub fn poll(&self) -> Result<Option<Arc<FutureTask<T>>>> {
        self.completed.poll()
    }

    /// Blocks up to `timeout` for a task to complete.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<Arc<FutureTask<T>>>> {
        self.completed.poll_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadPoolExecutorBuilder;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn returns_tasks_in_completion_order() {
        let pool = ThreadPoolExecutorBuilder::new()
            .core_size(4)
            .max_size(4)
            .build()
            .unwrap();
        let service: ExecutorCompletionService<'_, u32> = ExecutorCompletionService::new(&pool);

        let delays = [30u64, 5, 15];
        for (i, delay) in delays.iter().enumerate() {
            let delay = *delay;
            let i = i as u32;
            service
                .submit(move || {
                    std::thread::sleep(Duration::from_millis(delay));
                    Ok(i)
                })
                .unwrap();
        }

        let first = service.take().unwrap().get().unwrap();
        assert_eq!(first, 1); // the 5ms task

        let second = service.take().unwrap().get().unwrap();
        let third = service.take().unwrap().get().unwrap();
        assert_eq!([second, third].iter().collect::<std::collections::HashSet<_>>().len(), 2);
    }

    #[test]
    fn poll_returns_none_before_any_completion() {
        let pool = ThreadPoolExecutorBuilder::new()
            .core_size(1)
            .max_size(1)
            .build()
            .unwrap();
        let service: ExecutorCompletionService<'_, u32> = ExecutorCompletionService::new(&pool);
        let started = Arc::new(AtomicU32::new(0));
        let started2 = started.clone();
        service
            .submit(move || {
                started2.store(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(50));
                Ok(1)
            })
            .unwrap();
        assert!(service.poll().unwrap().is_none());
    }
}
