// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`DelayQueue`] — a priority queue of [`Delayed`] items under a single
//! monitor lock. `poll` only succeeds once the head's delay has expired;
//! `take` waits exactly the head's remaining delay (or indefinitely while
//! empty). A new head that supersedes the old one (sooner expiry) wakes
//! every waiter so they can re-evaluate how long to sleep.

use crate::error::{Result, ThreadPoolError};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// An element with an associated expiry. The queue's head is always the
/// item whose delay expired furthest in the past, or will expire soonest.
pub trait Delayed {
    /// Time remaining until this item is eligible for `poll`/`take`. A
    /// non-positive (zero or negative) remaining delay means the item is
    /// ready now.
    fn remaining_delay(&self) -> Duration;

    /// The absolute expiry instant, used to order the heap.
    fn expires_at(&self) -> Instant;
}

struct Heap<T> {
    data: Vec<T>,
    broken: bool,
}

/// Delay queue: a min-heap ordered by [`Delayed::expires_at`].
pub struct DelayQueue<T: Delayed> {
    heap: Mutex<Heap<T>>,
    available: Condvar,
}

impl<T: Delayed> DelayQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(Heap {
                data: Vec::new(),
                broken: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Heap<T>> {
        self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn sift_up(data: &mut [T], mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if data[i].expires_at() < data[parent].expires_at() {
                data.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(data: &mut [T], mut i: usize) {
        let len = data.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && data[left].expires_at() < data[smallest].expires_at() {
                smallest = left;
            }
            if right < len && data[right].expires_at() < data[smallest].expires_at() {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            data.swap(i, smallest);
            i = smallest;
        }
    }

    fn pop_locked(heap: &mut Heap<T>) -> Option<T> {
        if heap.data.is_empty() {
            return None;
        }
        let last = heap.data.len() - 1;
        heap.data.swap(0, last);
        let item = heap.data.pop();
        if !heap.data.is_empty() {
            Self::sift_down(&mut heap.data, 0);
        }
        item
    }

    /// Inserts `item`, waking waiters if it becomes the new (sooner) head.
    pub fn offer(&self, item: T) -> Result<bool> {
        let mut heap = self.lock();
        if heap.broken {
            return Err(ThreadPoolError::QueueBroken);
        }
        let becomes_new_head = heap
            .data
            .first()
            .map(|head| item.expires_at() < head.expires_at())
            .unwrap_or(true);
        heap.data.push(item);
        let last = heap.data.len() - 1;
        Self::sift_up(&mut heap.data, last);
        drop(heap);
        if becomes_new_head {
            self.available.notify_all();
        } else {
            self.available.notify_one();
        }
        Ok(true)
    }

    /// Removes and returns the head only if its delay has already expired.
    pub fn poll(&self) -> Result<Option<T>> {
        let mut heap = self.lock();
        if heap.broken {
            return Err(ThreadPoolError::QueueBroken);
        }
        let ready = heap
            .data
            .first()
            .map(|head| head.remaining_delay() <= Duration::ZERO)
            .unwrap_or(false);
        Ok(if ready { Self::pop_locked(&mut heap) } else { None })
    }

    /// Removes and returns the head, waiting exactly its remaining delay
    /// (or indefinitely while the queue is empty).
    pub fn take(&self) -> Result<T> {
        let mut heap = self.lock();
        loop {
            if heap.broken && heap.data.is_empty() {
                return Err(ThreadPoolError::QueueBroken);
            }
            match heap.data.first() {
                None => {
                    heap = self
                        .available
                        .wait(heap)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                }
                Some(head) => {
                    let remaining = head.remaining_delay();
                    if remaining <= Duration::ZERO {
                        return Ok(Self::pop_locked(&mut heap).expect("head present"));
                    }
                    let (guard, _timed_out) = self
                        .available
                        .wait_timeout(heap, remaining)
                        .unwrap_or_else(std::sync::PoisonError::into_inner);
                    heap = guard;
                    // Either the wait elapsed (head is now ready, or a new
                    // sooner head arrived) or we were woken early by
                    // `offer`; either way, loop and re-check the head.
                }
            }
        }
    }

    /// Removes and returns the head, waiting up to `timeout` total.
    pub fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = Instant::now() + timeout;
        let mut heap = self.lock();
        loop {
            if heap.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            if let Some(head) = heap.data.first() {
                let remaining = head.remaining_delay();
                if remaining <= Duration::ZERO {
                    return Ok(Self::pop_locked(&mut heap));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait_for = heap
                .data
                .first()
                .map(|h| h.remaining_delay().min(deadline - now))
                .unwrap_or(deadline - now);
            let (guard, _timed_out) = self
                .available
                .wait_timeout(heap, wait_for)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            heap = guard;
        }
    }

    /// Inspects the head without removing it, regardless of expiry.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.lock().data.first().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self) {
        let mut heap = self.lock();
        heap.broken = true;
        self.available.notify_all();
    }
}

impl<T: Delayed> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        label: &'static str,
        at: Instant,
    }

    impl Delayed for Item {
        fn remaining_delay(&self) -> Duration {
            self.at.saturating_duration_since(Instant::now())
        }

        fn expires_at(&self) -> Instant {
            self.at
        }
    }

    #[test]
    fn take_returns_soonest_first() {
        let now = Instant::now();
        let q = DelayQueue::new();
        q.offer(Item {
            label: "far",
            at: now + Duration::from_millis(120),
        })
        .unwrap();
        q.offer(Item {
            label: "near",
            at: now + Duration::from_millis(20),
        })
        .unwrap();

        let first = q.take().unwrap();
        assert_eq!(first.label, "near");
        let second = q.take().unwrap();
        assert_eq!(second.label, "far");
    }

    #[test]
    fn poll_before_expiry_returns_none() {
        let q = DelayQueue::new();
        q.offer(Item {
            label: "later",
            at: Instant::now() + Duration::from_secs(10),
        })
        .unwrap();
        assert_eq!(q.poll().unwrap(), None);
    }
}
