// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! Collaborator contracts ([`ThreadFactory`], [`ContextCarrierFactory`]) and
//! the [`ThreadPoolExecutorBuilder`] that assembles a [`ThreadPoolExecutor`].

use super::pool::ThreadPoolExecutor;
use super::rejection::RejectionPolicy;
use crate::error::{Result, ThreadPoolError};
use crate::queue::LinkedBlockingQueue;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Produces the OS threads backing worker slots. Returning `None` is
/// tolerated — the pool simply has one fewer worker than requested — but
/// degrades throughput.
pub trait ThreadFactory: Send + Sync {
    fn new_thread(&self, task: Box<dyn FnOnce() + Send>) -> Option<JoinHandle<()>>;
}

/// The default factory: `std::thread::Builder` with a pool-scoped name.
pub struct DefaultThreadFactory {
    name_prefix: String,
    counter: std::sync::atomic::AtomicU64,
}

impl DefaultThreadFactory {
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

impl ThreadFactory for DefaultThreadFactory {
    fn new_thread(&self, task: Box<dyn FnOnce() + Send>) -> Option<JoinHandle<()>> {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        std::thread::Builder::new()
            .name(format!("{}-{n}", self.name_prefix))
            .spawn(task)
            .ok()
    }
}

/// Snapshots ambient caller context at submit time, to be restored by the
/// worker immediately before it runs the task.
pub trait ContextCarrier: Send {
    fn restore(&self);
}

/// Produces a [`ContextCarrier`] for each submission.
pub trait ContextCarrierFactory: Send + Sync {
    fn create(&self) -> Box<dyn ContextCarrier>;
}

/// Builds a [`ThreadPoolExecutor`], validating configuration up front
/// rather than panicking deep inside the dispatch loop.
pub struct ThreadPoolExecutorBuilder {
    core_size: u32,
    max_size: u32,
    keep_alive: Duration,
    allow_core_timeout: bool,
    work_queue: Option<Arc<LinkedBlockingQueue<super::Runnable>>>,
    thread_factory: Option<Arc<dyn ThreadFactory>>,
    rejection_policy: RejectionPolicy,
    context_carrier_factory: Option<Arc<dyn ContextCarrierFactory>>,
}

impl Default for ThreadPoolExecutorBuilder {
    fn default() -> Self {
        Self {
            core_size: 0,
            max_size: 1,
            keep_alive: Duration::from_secs(60),
            allow_core_timeout: false,
            work_queue: None,
            thread_factory: None,
            rejection_policy: RejectionPolicy::Abort,
            context_carrier_factory: None,
        }
    }
}

impl ThreadPoolExecutorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn core_size(mut self, core_size: u32) -> Self {
        self.core_size = core_size;
        self
    }

    #[must_use]
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub fn allow_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    #[must_use]
    pub fn work_queue(mut self, queue: Arc<LinkedBlockingQueue<super::Runnable>>) -> Self {
        self.work_queue = Some(queue);
        self
    }

    #[must_use]
    pub fn thread_factory(mut self, factory: Arc<dyn ThreadFactory>) -> Self {
        self.thread_factory = Some(factory);
        self
    }

    #[must_use]
    pub fn rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }

    #[must_use]
    pub fn context_carrier_factory(mut self, factory: Arc<dyn ContextCarrierFactory>) -> Self {
        self.context_carrier_factory = Some(factory);
        self
    }

    /// Validates configuration and constructs the executor.
    ///
    /// # Errors
    ///
    /// Returns `ThreadPoolError::Execution` wrapping a descriptive message
    /// if `max_size` is zero or `core_size` exceeds `max_size`.
    pub fn build(self) -> Result<ThreadPoolExecutor> {
        if self.max_size == 0 {
            return Err(invalid("max_size must be >= 1"));
        }
        if self.core_size > self.max_size {
            return Err(invalid("core_size must be <= max_size"));
        }

        let work_queue = self
            .work_queue
            .unwrap_or_else(|| Arc::new(LinkedBlockingQueue::new()));
        let thread_factory = self
            .thread_factory
            .unwrap_or_else(|| Arc::new(DefaultThreadFactory::new("taskpool-worker")));

        Ok(ThreadPoolExecutor::from_builder(
            self.core_size,
            self.max_size,
            self.keep_alive,
            self.allow_core_timeout,
            work_queue,
            thread_factory,
            self.rejection_policy,
            self.context_carrier_factory,
        ))
    }
}

#[derive(Debug)]
struct InvalidConfig(&'static str);

impl std::fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid executor configuration: {}", self.0)
    }
}

impl std::error::Error for InvalidConfig {}

fn invalid(message: &'static str) -> ThreadPoolError {
    ThreadPoolError::execution(InvalidConfig(message))
}
