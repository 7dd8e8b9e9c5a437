// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! Bulk-invocation algorithms built on top of [`Executor`] and
//! [`FutureTask`]: [`invoke_any`] (first success wins), [`invoke_all`]
//! (wait for every outcome), and [`invoke_all_or_fail`] (wait for every
//! success, bail on the first failure).
//!
//! All three cancel whatever tasks are still outstanding before returning —
//! a caller that gets a result back never leaves orphaned work running
//! silently in the pool.

use crate::error::{Result, ThreadPoolError};
use crate::executor::Executor;
use crate::queue::{BlockingQueue, LinkedBlockingQueue};
use crate::task::FutureTask;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Work<T> = dyn FnOnce() -> std::result::Result<T, ThreadPoolError> + Send;

fn submit_all<T, I, F>(executor: &dyn Executor, tasks: I) -> Vec<Arc<FutureTask<T>>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
{
    tasks
        .into_iter()
        .map(|work| {
            let task = Arc::new(FutureTask::new(work));
            let runnable = task.clone();
            // A task the executor never accepted would otherwise leave
            // `get`/`get_timeout` waiting forever on a future that's stuck
            // in `NEW`; cancelling it up front gives callers a prompt
            // `Cancelled` instead of a hang.
            if executor.execute(Box::new(move || runnable.run())).is_err() {
                task.cancel(false);
            }
            task
        })
        .collect()
}

fn cancel_all<T: Clone + Send + 'static>(futures: &[Arc<FutureTask<T>>]) {
    for task in futures {
        task.cancel(true);
    }
}

/// Submits every task in `tasks`, returns the value of whichever completes
/// successfully first, and cancels the rest before returning. If every task
/// fails (or `timeout` elapses first), returns the last observed failure
/// (or [`ThreadPoolError::Timeout`]).
///
/// # Errors
///
/// [`ThreadPoolError::Rejected`] if no task could be submitted at all;
/// otherwise whatever the last task to fail returned, or
/// [`ThreadPoolError::Timeout`].
pub fn invoke_any<T, I, F>(executor: &dyn Executor, tasks: I, timeout: Option<Duration>) -> Result<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let completed: Arc<LinkedBlockingQueue<Arc<FutureTask<T>>>> = Arc::new(LinkedBlockingQueue::new());

    let futures: Vec<_> = tasks
        .into_iter()
        .map(|work| {
            let task = Arc::new(FutureTask::new(work));
            let hook_task = task.clone();
            let completed_for_hook = completed.clone();
            task.set_done_hook(move || {
                let _ = completed_for_hook.offer(hook_task);
            });
            let runnable = task.clone();
            if executor.execute(Box::new(move || runnable.run())).is_err() {
                task.cancel(false);
            }
            task
        })
        .collect();

    if futures.is_empty() {
        return Err(ThreadPoolError::Rejected);
    }

    let mut remaining = futures.len();
    let mut last_failure = ThreadPoolError::Rejected;

    let outcome = loop {
        if remaining == 0 {
            break Err(last_failure);
        }
        let next = match deadline {
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    break Err(ThreadPoolError::Timeout);
                }
                completed.poll_timeout(d - now)?
            }
            None => Some(completed.take()?),
        };
        let Some(task) = next else {
            break Err(ThreadPoolError::Timeout);
        };
        remaining -= 1;
        match task.get() {
            Ok(value) => break Ok(value),
            Err(err) => last_failure = err,
        }
    };

    cancel_all(&futures);
    outcome
}

/// Submits every task in `tasks` and blocks until all of them have reached
/// a terminal state (success, failure, or cancellation), returning the
/// completed futures in submission order for the caller to inspect
/// individually via [`FutureTask::get`].
pub fn invoke_all<T, I, F>(executor: &dyn Executor, tasks: I) -> Vec<Arc<FutureTask<T>>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
{
    let futures = submit_all(executor, tasks);
    for task in &futures {
        let _ = task.get();
    }
    futures
}

/// Submits every task in `tasks` and blocks until every one has succeeded,
/// or `timeout` elapses, or any one fails — whichever comes first. On any
/// non-success exit, every outstanding task is cancelled before returning.
///
/// # Errors
///
/// The first observed failure (in submission order), or
/// [`ThreadPoolError::Timeout`] if `timeout` elapses before all tasks
/// succeed.
pub fn invoke_all_or_fail<T, I, F>(
    executor: &dyn Executor,
    tasks: I,
    timeout: Option<Duration>,
) -> Result<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = F>,
    F: FnOnce() -> std::result::Result<T, ThreadPoolError> + Send + 'static,
{
    let deadline = timeout.map(|t| Instant::now() + t);
    let futures = submit_all(executor, tasks);

    let mut results = Vec::with_capacity(futures.len());
    let mut failure = None;

    for task in &futures {
        let outcome = match deadline {
            Some(d) => {
                let now = Instant::now();
                if now >= d {
                    failure = Some(ThreadPoolError::Timeout);
                    break;
                }
                task.get_timeout(d - now)
            }
            None => task.get(),
        };
        match outcome {
            Ok(value) => results.push(value),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    if let Some(err) = failure {
        cancel_all(&futures);
        return Err(err);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ThreadPoolExecutorBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(size: u32) -> crate::executor::ThreadPoolExecutor {
        ThreadPoolExecutorBuilder::new()
            .core_size(size)
            .max_size(size)
            .build()
            .unwrap()
    }

    #[test]
    fn invoke_any_returns_first_success() {
        let executor = pool(4);
        let tasks: Vec<Box<Work<u32>>> = vec![
            Box::new(|| {
                std::thread::sleep(Duration::from_millis(40));
                Ok(1)
            }),
            Box::new(|| {
                std::thread::sleep(Duration::from_millis(5));
                Ok(2)
            }),
        ];
        let result = invoke_any(&executor, tasks, None).unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn invoke_any_surfaces_failure_when_all_fail() {
        let executor = pool(2);
        let tasks: Vec<Box<Work<u32>>> = vec![
            Box::new(|| Err(ThreadPoolError::execution(crate::error::TaskPanic::new("a")))),
            Box::new(|| Err(ThreadPoolError::execution(crate::error::TaskPanic::new("b")))),
        ];
        let result = invoke_any(&executor, tasks, None);
        assert!(matches!(result, Err(ThreadPoolError::Execution(_))));
    }

    #[test]
    fn invoke_all_waits_for_every_task() {
        let executor = pool(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<Box<Work<u32>>> = (0..3)
            .map(|i| {
                let counter = counter.clone();
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                }) as Box<Work<u32>>
            })
            .collect();
        let futures = invoke_all(&executor, tasks);
        assert_eq!(futures.len(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        for task in futures {
            assert!(task.is_done());
        }
    }

    #[test]
    fn invoke_all_or_fail_cancels_remaining_on_first_failure() {
        let executor = pool(3);
        let started = Arc::new(AtomicUsize::new(0));
        let started2 = started.clone();
        let tasks: Vec<Box<Work<u32>>> = vec![
            Box::new(|| Err(ThreadPoolError::execution(crate::error::TaskPanic::new("boom")))),
            Box::new(move || {
                started2.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                Ok(1)
            }),
        ];
        let result = invoke_all_or_fail(&executor, tasks, None);
        assert!(result.is_err());
    }
}
