// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! End-to-end scenarios exercising the executor, bulk-invoke algorithms, and
//! the priority/delay queues together, the way a caller actually uses them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskpool::{
    bulk, ArrayBlockingQueue, BlockingQueue, DelayQueue, Delayed, PriorityBlockingQueue, Result,
    ThreadPoolError, ThreadPoolExecutorBuilder,
};

/// Fixed pool of 2 workers, unbounded queue, three tasks of varying sleep
/// duration. The first two should start immediately; the third should wait
/// for a slot, then run; all three should resolve and the pool should have
/// executed exactly three tasks.
#[test]
fn fixed_pool_of_two_runs_three_staggered_tasks() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(2)
        .max_size(2)
        .build()
        .unwrap();

    let start = Instant::now();
    let started = Arc::new(AtomicU32::new(0));

    let mut futures = Vec::new();
    for delay_ms in [50u64, 50, 10] {
        let started = started.clone();
        let future = pool
            .submit(move || {
                started.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(delay_ms));
                Ok::<u64, ThreadPoolError>(delay_ms)
            })
            .unwrap();
        futures.push(future);
    }

    for future in &futures {
        future.get().unwrap();
    }
    let elapsed = start.elapsed();

    // Two 50ms tasks run concurrently, the 10ms task waits for a slot then
    // runs quickly — total wall time should be well under 100ms (sum of
    // all three) and at least 50ms (the longest individual task).
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(150));
    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert_eq!(pool.completed_task_count(), 3);
}

/// `core=0, max=1, keep_alive=100ms`: a single worker should time out and
/// exit once idle past its keep-alive window.
#[test]
fn idle_worker_above_core_size_times_out() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(0)
        .max_size(1)
        .keep_alive(Duration::from_millis(100))
        .build()
        .unwrap();

    pool.submit(|| Ok::<(), ThreadPoolError>(())).unwrap();

    // Give the task time to run, then wait past the keep-alive window plus
    // the worker's poll granularity.
    std::thread::sleep(Duration::from_millis(250));

    assert_eq!(pool.pool_size(), 0);
}

/// `invoke_any` over two failing tasks and one successful one should return
/// the successful value.
#[test]
fn invoke_any_returns_the_success_among_failures() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(3)
        .max_size(3)
        .build()
        .unwrap();

    let tasks: Vec<Box<dyn FnOnce() -> std::result::Result<i32, ThreadPoolError> + Send>> = vec![
        Box::new(|| Err(ThreadPoolError::execution(taskpool::error::TaskPanic::new("boom-a")))),
        Box::new(|| Err(ThreadPoolError::execution(taskpool::error::TaskPanic::new("boom-b")))),
        Box::new(|| Ok(7)),
    ];

    let result = bulk::invoke_any(&pool, tasks, None).unwrap();
    assert_eq!(result, 7);
}

/// `invoke_all_or_fail` over a success, a failure, and another success
/// should propagate the failure and leave nothing outstanding.
#[test]
fn invoke_all_or_fail_propagates_first_failure() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(3)
        .max_size(3)
        .build()
        .unwrap();

    let tasks: Vec<Box<dyn FnOnce() -> std::result::Result<i32, ThreadPoolError> + Send>> = vec![
        Box::new(|| Ok(1)),
        Box::new(|| Err(ThreadPoolError::execution(taskpool::error::TaskPanic::new("boom")))),
        Box::new(|| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(3)
        }),
    ];

    let result: Result<Vec<i32>> = bulk::invoke_all_or_fail(&pool, tasks, None);
    assert!(matches!(result, Err(ThreadPoolError::Execution(_))));
}

/// A priority queue seeded out of order should drain in ascending order.
#[test]
fn priority_queue_drains_in_ascending_order() {
    let queue: PriorityBlockingQueue<i32> = PriorityBlockingQueue::new();
    queue.offer(5).unwrap();
    queue.offer(1).unwrap();
    queue.offer(3).unwrap();

    assert_eq!(queue.poll().unwrap(), Some(1));
    assert_eq!(queue.poll().unwrap(), Some(3));
    assert_eq!(queue.poll().unwrap(), Some(5));
    assert_eq!(queue.poll().unwrap(), None);
}

#[derive(Clone)]
struct Expiring {
    label: &'static str,
    at: Instant,
}

impl Delayed for Expiring {
    fn remaining_delay(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn expires_at(&self) -> Instant {
        self.at
    }
}

/// A delay queue seeded with items expiring at +50ms and +10ms should yield
/// the sooner item first, and the whole sequence should take at least
/// 50ms.
#[test]
fn delay_queue_yields_items_in_expiry_order() {
    let queue: DelayQueue<Expiring> = DelayQueue::new();
    let now = Instant::now();
    queue
        .offer(Expiring {
            label: "later",
            at: now + Duration::from_millis(50),
        })
        .unwrap();
    queue
        .offer(Expiring {
            label: "sooner",
            at: now + Duration::from_millis(10),
        })
        .unwrap();

    let start = Instant::now();
    let first = queue.take().unwrap();
    let second = queue.take().unwrap();
    let elapsed = start.elapsed();

    assert_eq!(first.label, "sooner");
    assert_eq!(second.label, "later");
    assert!(elapsed >= Duration::from_millis(50));
}

/// After `shutdown()`, previously submitted tasks still run to completion,
/// new submissions are rejected, and the pool eventually reaches
/// `is_terminated()`.
#[test]
fn shutdown_drains_queued_work_then_rejects_new_submissions() {
    // `allow_core_timeout` + a short `keep_alive` so the sole worker — which
    // sits at `core_size`, not above it — still exits once idle after
    // shutdown rather than polling the now-empty queue indefinitely.
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(1)
        .max_size(1)
        .allow_core_timeout(true)
        .keep_alive(Duration::from_millis(50))
        .build()
        .unwrap();

    let future = pool
        .submit(|| {
            std::thread::sleep(Duration::from_millis(30));
            Ok::<u32, ThreadPoolError>(1)
        })
        .unwrap();

    pool.shutdown();
    assert!(pool.is_shutdown());

    let rejected = pool.submit(|| Ok::<u32, ThreadPoolError>(2));
    assert!(matches!(rejected, Err(ThreadPoolError::Rejected)));

    assert_eq!(future.get().unwrap(), 1);
    assert!(pool.await_termination(Duration::from_millis(500)));
    assert!(pool.is_terminated());
}

/// `shutdown_now()` returns exactly the tasks that were still queued (not
/// the one already dispatched to the sole worker), and the pool still
/// reaches `TERMINATED` once that in-flight task finishes.
#[test]
fn shutdown_now_returns_queued_tasks_and_still_terminates() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(1)
        .max_size(1)
        .build()
        .unwrap();

    let ran_first = Arc::new(AtomicU32::new(0));
    {
        let ran_first = ran_first.clone();
        pool.submit(move || {
            std::thread::sleep(Duration::from_millis(100));
            ran_first.fetch_add(1, Ordering::SeqCst);
            Ok::<(), ThreadPoolError>(())
        })
        .unwrap();
    }
    // Queued behind the worker already busy with the first task above.
    pool.submit(|| Ok::<(), ThreadPoolError>(())).unwrap();
    pool.submit(|| Ok::<(), ThreadPoolError>(())).unwrap();

    // Give the first task a moment to actually start before shutting down,
    // so it's the in-flight task and the other two are still queued.
    std::thread::sleep(Duration::from_millis(20));

    let queued = pool.shutdown_now();
    assert_eq!(queued.len(), 2);

    assert!(pool.await_termination(Duration::from_millis(500)));
    assert!(pool.is_terminated());
    assert_eq!(ran_first.load(Ordering::SeqCst), 1);
}

/// `await_termination` should time out and return `false` while the pool is
/// still running, then return `true` once shut down.
#[test]
fn await_termination_times_out_before_shutdown_then_succeeds() {
    let pool = ThreadPoolExecutorBuilder::new()
        .core_size(1)
        .max_size(1)
        .build()
        .unwrap();

    assert!(!pool.is_terminated());
    assert!(!pool.await_termination(Duration::from_millis(50)));

    pool.shutdown();
    assert!(pool.await_termination(Duration::from_millis(500)));
    assert!(pool.is_terminated());
}

/// Sanity check that `ArrayBlockingQueue` participates in the same
/// `BlockingQueue` surface as the other queue types (used by executors
/// configured with a bounded work queue).
#[test]
fn array_queue_blocks_take_until_offer() {
    let queue: Arc<ArrayBlockingQueue<u32>> = Arc::new(ArrayBlockingQueue::new(1));
    let reader = {
        let queue = queue.clone();
        std::thread::spawn(move || queue.take().unwrap())
    };
    std::thread::sleep(Duration::from_millis(20));
    queue.offer(42).unwrap();
    assert_eq!(reader.join().unwrap(), 42);
}
