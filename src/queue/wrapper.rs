// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`BlockingQueueWrapper`] lifts any plain FIFO queue (anything implementing
//! [`PlainQueue`]) to the full [`BlockingQueue`] capability set using a
//! single reentrant-style lock plus `not_empty`/`not_full` conditions —
//! identical semantics to [`ArrayBlockingQueue`](super::ArrayBlockingQueue).
//!
//! # Fairness caveat
//!
//! Under `fair = true`, a racing non-blocking `offer` plus `signal` can, in
//! rare interleavings, grant queue access out of strict arrival order. This
//! is a documented non-guarantee inherited from the underlying
//! `Condvar`/`Mutex` primitives, not a bug.

use super::BlockingQueue;
use crate::error::{Result, ThreadPoolError};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The minimal interface a plain (non-blocking, non-thread-safe) queue must
/// provide to be wrapped by [`BlockingQueueWrapper`].
pub trait PlainQueue<T> {
    fn push_back(&mut self, item: T) -> bool;
    fn pop_front(&mut self) -> Option<T>;
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
}

impl<T> PlainQueue<T> for std::collections::VecDeque<T> {
    fn push_back(&mut self, item: T) -> bool {
        std::collections::VecDeque::push_back(self, item);
        true
    }

    fn pop_front(&mut self) -> Option<T> {
        std::collections::VecDeque::pop_front(self)
    }

    fn len(&self) -> usize {
        std::collections::VecDeque::len(self)
    }

    fn capacity(&self) -> usize {
        usize::MAX
    }
}

struct Inner<Q, T> {
    queue: Q,
    broken: bool,
    _marker: std::marker::PhantomData<T>,
}

/// Wraps any [`PlainQueue`] implementation with blocking semantics.
pub struct BlockingQueueWrapper<Q, T> {
    inner: Mutex<Inner<Q, T>>,
    not_empty: Condvar,
    not_full: Condvar,
    fair: bool,
}

enum Wait {
    None,
    Deadline(Instant),
    Forever,
}

impl<Q, T> BlockingQueueWrapper<Q, T>
where
    Q: PlainQueue<T>,
{
    #[must_use]
    pub fn new(queue: Q) -> Self {
        Self::with_fairness(queue, false)
    }

    #[must_use]
    pub fn with_fairness(queue: Q, fair: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue,
                broken: false,
                _marker: std::marker::PhantomData,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            fair,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<Q, T>> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn close(&self) {
        let mut inner = self.lock();
        inner.broken = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }

    fn do_put(&self, item: T, wait: Wait) -> Result<bool> {
        let mut inner = self.lock();
        let mut item = Some(item);
        loop {
            if inner.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            if inner.queue.len() < inner.queue.capacity() {
                break;
            }
            match wait {
                Wait::None => return Ok(false),
                Wait::Forever => {
                    inner = self
                        .not_full
                        .wait(inner)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(false);
                    }
                    let (guard, timed_out) = self
                        .not_full
                        .wait_timeout(inner, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    inner = guard;
                    if timed_out.timed_out()
                        && inner.queue.len() >= inner.queue.capacity()
                        && !inner.broken
                    {
                        return Ok(false);
                    }
                }
            }
        }
        let inserted = inner.queue.push_back(item.take().unwrap());
        self.not_empty.notify_one();
        if self.fair {
            self.not_full.notify_all();
        }
        Ok(inserted)
    }

    fn do_take(&self, wait: Wait) -> Result<Option<T>> {
        let mut inner = self.lock();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                self.not_full.notify_one();
                if self.fair {
                    self.not_empty.notify_all();
                }
                return Ok(Some(item));
            }
            if inner.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            match wait {
                Wait::None => return Ok(None),
                Wait::Forever => {
                    inner = self
                        .not_empty
                        .wait(inner)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(None);
                    }
                    let (guard, timed_out) = self
                        .not_empty
                        .wait_timeout(inner, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    inner = guard;
                    if timed_out.timed_out() && inner.queue.len() == 0 {
                        return Ok(None);
                    }
                }
            }
        }
    }
}

impl<Q, T> BlockingQueue<T> for BlockingQueueWrapper<Q, T>
where
    Q: PlainQueue<T> + Send,
    T: Send,
{
    fn offer(&self, item: T) -> Result<bool> {
        self.do_put(item, Wait::None)
    }

    fn offer_timeout(&self, item: T, timeout: Duration) -> Result<bool> {
        self.do_put(item, Wait::Deadline(super::deadline_from(timeout)))
    }

    fn put(&self, item: T) -> Result<()> {
        self.do_put(item, Wait::Forever).map(|_| ())
    }

    fn poll(&self) -> Result<Option<T>> {
        self.do_take(Wait::None)
    }

    fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        self.do_take(Wait::Deadline(super::deadline_from(timeout)))
    }

    fn take(&self) -> Result<T> {
        self.do_take(Wait::Forever)?
            .ok_or(ThreadPoolError::QueueBroken)
    }

    fn len(&self) -> usize {
        self.lock().queue.len()
    }

    fn remaining_capacity(&self) -> usize {
        let inner = self.lock();
        inner.queue.capacity().saturating_sub(inner.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn wraps_vecdeque_fifo() {
        let q: BlockingQueueWrapper<VecDeque<i32>, i32> = BlockingQueueWrapper::new(VecDeque::new());
        for i in 0..5 {
            q.offer(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(q.poll().unwrap(), Some(i));
        }
    }
}
