// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`LinkedBlockingQueue`] — an optionally-bounded FIFO queue using the
//! classic two-lock hand-off: a `put` lock serializes the tail, a `take`
//! lock serializes the head, and a shared atomic `count` lets a producer
//! and a consumer make progress without contending on the same lock.

use super::BlockingQueue;
use crate::error::{Result, ThreadPoolError};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct Node<T> {
    item: Option<T>,
    next: *mut Node<T>,
}

impl<T> Node<T> {
    fn new(item: Option<T>) -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            item,
            next: ptr::null_mut(),
        }))
    }
}

/// How long a blocking operation is willing to wait.
#[derive(Clone, Copy)]
enum Wait {
    /// Return immediately if the condition isn't already satisfied.
    None,
    /// Wait until `Instant`, then give up.
    Deadline(Instant),
    /// Wait indefinitely.
    Forever,
}

/// FIFO queue built on the two-lock algorithm from `java.util.concurrent`'s
/// `LinkedBlockingQueue`, adapted to `std::sync` primitives.
///
/// # Lock discipline
///
/// `head` is protected by the take lock/`not_empty`; `last` is protected by
/// the put lock/`not_full`. `count` is a shared atomic so most operations
/// only need one of the two locks; `remove`/`drain` acquire both, always
/// put lock then take lock, to avoid deadlock with the reverse order.
///
/// # Broken state
///
/// Calling [`close`](Self::close) wakes every waiter; subsequent `put`-family
/// calls fail with [`ThreadPoolError::QueueBroken`]. `take`/`poll` keep
/// succeeding while items remain, and only fail once the queue is both
/// empty and broken. [`reopen`](Self::reopen) restores normal operation.
pub struct LinkedBlockingQueue<T> {
    capacity: usize,
    count: AtomicUsize,
    head: Mutex<*mut Node<T>>,
    last: Mutex<*mut Node<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    broken: AtomicBool,
}

// SAFETY: `*mut Node<T>` pointers are only ever dereferenced while holding
// the lock (`head` or `last`) that owns them, and `T: Send` is required to
// move elements across threads.
unsafe impl<T: Send> Send for LinkedBlockingQueue<T> {}
unsafe impl<T: Send> Sync for LinkedBlockingQueue<T> {}

impl<T> LinkedBlockingQueue<T> {
    /// Creates an unbounded queue (capacity `usize::MAX`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Creates a queue bounded to at most `capacity` elements.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let sentinel = Node::new(None);
        Self {
            capacity,
            count: AtomicUsize::new(0),
            head: Mutex::new(sentinel),
            last: Mutex::new(sentinel),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            broken: AtomicBool::new(false),
        }
    }

    /// Permanently closes the queue: wakes every waiter and fails every
    /// subsequent `put`-family call with [`ThreadPoolError::QueueBroken`].
    /// `take`/`poll` continue to drain whatever remains.
    pub fn close(&self) {
        self.broken.store(true, Ordering::SeqCst);
        {
            let _put = self.put_lock_guard();
            self.not_full.notify_all();
        }
        {
            let _take = self.take_lock_guard();
            self.not_empty.notify_all();
        }
    }

    /// Restores normal operation after [`close`](Self::close).
    pub fn reopen(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }

    /// Returns `true` if [`close`](Self::close) has been called without a
    /// matching [`reopen`](Self::reopen).
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::SeqCst)
    }

    fn put_lock_guard(&self) -> MutexGuard<'_, *mut Node<T>> {
        self.last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_lock_guard(&self) -> MutexGuard<'_, *mut Node<T>> {
        self.head
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn signal_not_empty(&self) {
        let _guard = self.take_lock_guard();
        self.not_empty.notify_one();
    }

    fn signal_not_full(&self) {
        let _guard = self.put_lock_guard();
        self.not_full.notify_one();
    }

    fn enqueue(&self, item: T, last: &mut *mut Node<T>) {
        let node = Node::new(Some(item));
        // SAFETY: `*last` is owned exclusively by the put lock we hold.
        unsafe {
            (**last).next = node;
        }
        *last = node;
    }

    fn dequeue(&self, head: &mut *mut Node<T>) -> T {
        // SAFETY: `*head` is the sentinel, owned exclusively by the take
        // lock we hold; its `next` becomes the new sentinel.
        unsafe {
            let old_head = *head;
            let first = (*old_head).next;
            debug_assert!(!first.is_null());
            *head = first;
            let item = (*first).item.take().expect("head item already consumed");
            drop(Box::from_raw(old_head));
            item
        }
    }

    fn do_put(&self, item: T, wait: Wait) -> Result<bool> {
        let mut last = self.put_lock_guard();
        let mut item = Some(item);
        loop {
            if self.broken.load(Ordering::SeqCst) {
                return Err(ThreadPoolError::QueueBroken);
            }
            if self.count.load(Ordering::Acquire) < self.capacity {
                break;
            }
            match wait {
                Wait::None => return Ok(false),
                Wait::Forever => {
                    last = self
                        .not_full
                        .wait(last)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(false);
                    }
                    let (guard, timed_out) = self
                        .not_full
                        .wait_timeout(last, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    last = guard;
                    if timed_out.timed_out()
                        && self.count.load(Ordering::Acquire) >= self.capacity
                        && !self.broken.load(Ordering::SeqCst)
                    {
                        return Ok(false);
                    }
                }
            }
        }

        self.enqueue(item.take().expect("item consumed twice"), &mut last);
        let prev_count = self.count.fetch_add(1, Ordering::Release);
        if prev_count + 1 < self.capacity {
            self.not_full.notify_one();
        }
        drop(last);
        self.signal_not_empty();
        Ok(true)
    }

    fn do_take(&self, wait: Wait) -> Result<Option<T>> {
        let mut head = self.take_lock_guard();
        loop {
            if self.count.load(Ordering::Acquire) > 0 {
                break;
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(ThreadPoolError::QueueBroken);
            }
            match wait {
                Wait::None => return Ok(None),
                Wait::Forever => {
                    head = self
                        .not_empty
                        .wait(head)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Wait::Deadline(when) => {
                    let now = Instant::now();
                    if now >= when {
                        return Ok(None);
                    }
                    let (guard, timed_out) = self
                        .not_empty
                        .wait_timeout(head, when - now)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    head = guard;
                    if timed_out.timed_out() && self.count.load(Ordering::Acquire) == 0 {
                        return Ok(None);
                    }
                }
            }
        }

        let item = self.dequeue(&mut head);
        let prev_count = self.count.fetch_sub(1, Ordering::Relaxed);
        if prev_count > 1 {
            self.not_empty.notify_one();
        }
        drop(head);
        if prev_count == self.capacity {
            self.signal_not_full();
        }
        Ok(Some(item))
    }

    /// Inspects and clones the head without removing it.
    #[must_use]
    pub fn peek_cloned(&self) -> Option<T>
    where
        T: Clone,
    {
        let head = self.take_lock_guard();
        // SAFETY: holding the take lock keeps the sentinel and its
        // immediate successor stable for the duration of the borrow.
        unsafe {
            let first = (**head).next;
            if first.is_null() {
                None
            } else {
                (*first).item.clone()
            }
        }
    }

    /// Removes a specific element equal to `item` by linear scan. Returns
    /// `true` if an element was removed.
    pub fn remove(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let mut put = self.put_lock_guard();
        let mut head = self.take_lock_guard();
        // SAFETY: both locks held, so the whole chain is stable.
        unsafe {
            let mut trail = *head;
            let mut cursor = (*trail).next;
            while !cursor.is_null() {
                if (*cursor).item.as_ref() == Some(item) {
                    (*trail).next = (*cursor).next;
                    if cursor == *put {
                        *put = trail;
                    }
                    drop(Box::from_raw(cursor));
                    self.count.fetch_sub(1, Ordering::Relaxed);
                    self.not_full.notify_one();
                    return true;
                }
                trail = cursor;
                cursor = (*cursor).next;
            }
        }
        false
    }

    /// Atomically removes up to `max` elements matching `predicate`,
    /// invoking `action` on each in FIFO order. Returns the number removed.
    pub fn drain(
        &self,
        mut action: impl FnMut(T),
        max: usize,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> usize {
        if max == 0 {
            return 0;
        }
        let mut put = self.put_lock_guard();
        let mut head = self.take_lock_guard();
        let mut removed = 0usize;
        // SAFETY: both locks held; splicing past matching nodes preserves
        // the sentinel invariant (`*head` always points at a dummy node).
        unsafe {
            let mut trail = *head;
            let mut cursor = (*trail).next;
            while !cursor.is_null() && removed < max {
                let next = (*cursor).next;
                let matched = (*cursor)
                    .item
                    .as_ref()
                    .map(|v| predicate(v))
                    .unwrap_or(false);
                if matched {
                    (*trail).next = next;
                    if cursor == *put {
                        *put = trail;
                    }
                    let item = (*cursor).item.take().unwrap();
                    drop(Box::from_raw(cursor));
                    action(item);
                    removed += 1;
                } else {
                    trail = cursor;
                }
                cursor = next;
            }
        }
        if removed > 0 {
            self.count.fetch_sub(removed, Ordering::Relaxed);
            self.not_full.notify_all();
        }
        removed
    }
}

impl<T> Default for LinkedBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LinkedBlockingQueue<T> {
    fn drop(&mut self) {
        // SAFETY: `&mut self` guarantees exclusive access; walk and free
        // the remaining chain including the sentinel.
        unsafe {
            let mut cursor = *self.head.get_mut().unwrap_or_else(|e| e.into_inner());
            while !cursor.is_null() {
                let next = (*cursor).next;
                drop(Box::from_raw(cursor));
                cursor = next;
            }
        }
    }
}

impl<T: Send> BlockingQueue<T> for LinkedBlockingQueue<T> {
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
        self.count.load(Ordering::Acquire)
    }

    fn remaining_capacity(&self) -> usize {
        self.capacity
            .saturating_sub(self.count.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_thread() {
        let q = LinkedBlockingQueue::new();
        for i in 0..5 {
            assert!(q.offer(i).unwrap());
        }
        for i in 0..5 {
            assert_eq!(q.poll().unwrap(), Some(i));
        }
        assert_eq!(q.poll().unwrap(), None);
    }

    #[test]
    fn bounded_offer_rejects_when_full() {
        let q: LinkedBlockingQueue<i32> = LinkedBlockingQueue::with_capacity(1);
        assert!(q.offer(1).unwrap());
        assert!(!q.offer(2).unwrap());
        assert_eq!(q.remaining_capacity(), 0);
    }

    #[test]
    fn capacity_one_serializes_producer_consumer() {
        let q = Arc::new(LinkedBlockingQueue::with_capacity(1));
        let producer_q = q.clone();
        let producer = thread::spawn(move || {
            for i in 0..100 {
                producer_q.put(i).unwrap();
            }
        });
        let mut received = Vec::new();
        for _ in 0..100 {
            received.push(q.take().unwrap());
        }
        producer.join().unwrap();
        let expected: Vec<i32> = (0..100).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn take_blocks_until_offer() {
        let q = Arc::new(LinkedBlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.take().unwrap());
        thread::sleep(Duration::from_millis(30));
        q.offer(42).unwrap();
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn close_wakes_waiters_and_breaks_put() {
        let q: Arc<LinkedBlockingQueue<i32>> = Arc::new(LinkedBlockingQueue::with_capacity(1));
        q.offer(1).unwrap();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.offer_timeout(2, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(30));
        q.close();
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(ThreadPoolError::QueueBroken)));
    }

    #[test]
    fn take_drains_then_breaks() {
        let q = LinkedBlockingQueue::with_capacity(4);
        q.offer(1).unwrap();
        q.offer(2).unwrap();
        q.close();
        assert_eq!(q.take().unwrap(), 1);
        assert_eq!(q.take().unwrap(), 2);
        assert!(matches!(q.take(), Err(ThreadPoolError::QueueBroken)));
    }

    #[test]
    fn remove_specific_element() {
        let q = LinkedBlockingQueue::new();
        for i in 0..5 {
            q.offer(i).unwrap();
        }
        assert!(q.remove(&2));
        assert!(!q.remove(&2));
        let mut remaining = Vec::new();
        while let Some(v) = q.poll().unwrap() {
            remaining.push(v);
        }
        assert_eq!(remaining, vec![0, 1, 3, 4]);
    }

    #[test]
    fn drain_matching_predicate() {
        let q = LinkedBlockingQueue::new();
        for i in 0..10 {
            q.offer(i).unwrap();
        }
        let mut drained = Vec::new();
        let n = q.drain(|v| drained.push(v), usize::MAX, |v| v % 2 == 0);
        assert_eq!(n, 5);
        assert_eq!(drained, vec![0, 2, 4, 6, 8]);
        let mut remaining = Vec::new();
        while let Some(v) = q.poll().unwrap() {
            remaining.push(v);
        }
        assert_eq!(remaining, vec![1, 3, 5, 7, 9]);
    }
}
