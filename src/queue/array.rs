// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`ArrayBlockingQueue`] — a fixed-capacity circular buffer guarded by a
//! single lock, with two condition variables coordinating producers and
//! consumers.

use super::BlockingQueue;
use crate::error::{Result, ThreadPoolError};
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Ring<T> {
    buf: VecDeque<T>,
    capacity: usize,
    broken: bool,
}

/// Array-backed bounded FIFO queue. Unlike [`LinkedBlockingQueue`], a single
/// lock protects the whole buffer — there is no independent head/tail
/// locking, which keeps `remove` and enumeration simple at the cost of
/// producer/consumer parallelism.
///
/// Construct with `fair = true` to request that waiters are woken in
/// roughly arrival order (`std::sync::Condvar` does not guarantee strict
/// FIFO wakeup, but `notify_one` on a single shared queue approximates it
/// closely in practice).
///
/// [`LinkedBlockingQueue`]: super::LinkedBlockingQueue
pub struct ArrayBlockingQueue<T> {
    state: Mutex<Ring<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    fair: bool,
}

#[derive(Clone, Copy)]
enum Wait {
    None,
    Deadline(Instant),
    Forever,
}

impl<T> ArrayBlockingQueue<T> {
    /// Creates a queue holding at most `capacity` elements, with
    /// unspecified wakeup order among waiters.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_fairness(capacity, false)
    }

    /// Creates a queue holding at most `capacity` elements. When `fair` is
    /// `true`, waiting threads are granted access in roughly arrival order.
    #[must_use]
    pub fn with_fairness(capacity: usize, fair: bool) -> Self {
        assert!(capacity > 0, "ArrayBlockingQueue capacity must be > 0");
        Self {
            state: Mutex::new(Ring {
                buf: VecDeque::with_capacity(capacity),
                capacity,
                broken: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            fair,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring<T>> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Permanently closes the queue; see [`LinkedBlockingQueue::close`].
    ///
    /// [`LinkedBlockingQueue::close`]: super::LinkedBlockingQueue::close
    pub fn close(&self) {
        let mut state = self.lock();
        state.broken = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Restores normal operation after [`close`](Self::close).
    pub fn reopen(&self) {
        self.lock().broken = false;
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }

    fn do_put(&self, item: T, wait: Wait) -> Result<bool> {
        let mut state = self.lock();
        let mut item = Some(item);
        loop {
            if state.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            if state.buf.len() < state.capacity {
                break;
            }
            match wait {
                Wait::None => return Ok(false),
                Wait::Forever => {
                    state = self
                        .not_full
                        .wait(state)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(false);
                    }
                    let (guard, timed_out) = self
                        .not_full
                        .wait_timeout(state, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    state = guard;
                    if timed_out.timed_out()
                        && state.buf.len() >= state.capacity
                        && !state.broken
                    {
                        return Ok(false);
                    }
                }
            }
        }
        state.buf.push_back(item.take().unwrap());
        self.not_empty.notify_one();
        if self.fair {
            self.not_full.notify_all();
        }
        Ok(true)
    }

    fn do_take(&self, wait: Wait) -> Result<Option<T>> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.buf.pop_front() {
                self.not_full.notify_one();
                if self.fair {
                    self.not_empty.notify_all();
                }
                return Ok(Some(item));
            }
            if state.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            match wait {
                Wait::None => return Ok(None),
                Wait::Forever => {
                    state = self
                        .not_empty
                        .wait(state)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(None);
                    }
                    let (guard, timed_out) = self
                        .not_empty
                        .wait_timeout(state, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    state = guard;
                    if timed_out.timed_out() && state.buf.is_empty() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Inspects the head without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.lock().buf.front().cloned()
    }

    /// Removes a specific element by linear scan, shifting the ring. Returns
    /// `true` if found and removed.
    pub fn remove(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let mut state = self.lock();
        if let Some(pos) = state.buf.iter().position(|v| v == item) {
            state.buf.remove(pos);
            self.not_full.notify_one();
            true
        } else {
            false
        }
    }

    /// Atomically removes up to `max` elements matching `predicate`.
    pub fn drain(
        &self,
        mut action: impl FnMut(T),
        max: usize,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> usize {
        let mut state = self.lock();
        let mut removed = 0usize;
        let mut kept = VecDeque::with_capacity(state.buf.len());
        while let Some(item) = state.buf.pop_front() {
            if removed < max && predicate(&item) {
                removed += 1;
                action(item);
            } else {
                kept.push_back(item);
            }
        }
        state.buf = kept;
        if removed > 0 {
            self.not_full.notify_all();
        }
        removed
    }
}

impl<T: Send> BlockingQueue<T> for ArrayBlockingQueue<T> {
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
        self.lock().buf.len()
    }

    fn remaining_capacity(&self) -> usize {
        let state = self.lock();
        state.capacity - state.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order() {
        let q = ArrayBlockingQueue::new(4);
        for i in 0..4 {
            assert!(q.offer(i).unwrap());
        }
        assert!(!q.offer(4).unwrap());
        for i in 0..4 {
            assert_eq!(q.poll().unwrap(), Some(i));
        }
    }

    #[test]
    fn take_blocks_until_offer_returns_exact_element() {
        let q = Arc::new(ArrayBlockingQueue::new(2));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.take().unwrap());
        thread::sleep(Duration::from_millis(30));
        q.offer(7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn remove_and_drain() {
        let q = ArrayBlockingQueue::new(8);
        for i in 0..6 {
            q.offer(i).unwrap();
        }
        assert!(q.remove(&3));
        let mut drained = Vec::new();
        let n = q.drain(|v| drained.push(v), 2, |_| true);
        assert_eq!(n, 2);
        assert_eq!(drained, vec![0, 1]);
    }
}
