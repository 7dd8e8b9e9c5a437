// Copyright (c) 2025 taskpool contributors. Licensed under Apache License, Version 2.0.

//! [`PriorityBlockingQueue`] — an array-backed binary min-heap guarded by a
//! single lock. `offer` is sift-up, `poll` is sift-down, and `remove`
//! locates the element by linear scan then sifts both directions from the
//! vacated slot, exactly as `java.util.concurrent.PriorityBlockingQueue`
//! does.

use super::BlockingQueue;
use crate::error::{Result, ThreadPoolError};
use std::cmp::Ordering;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

type Comparator<T> = Box<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

struct Heap<T> {
    data: Vec<T>,
    broken: bool,
}

/// Unbounded priority queue. Ordering defaults to `T`'s natural [`Ord`]
/// impl via [`PriorityBlockingQueue::new`]; [`PriorityBlockingQueue::with_comparator`]
/// accepts an arbitrary comparator. Ties are broken arbitrarily (whichever
/// element the heap happens to compare first).
pub struct PriorityBlockingQueue<T> {
    heap: Mutex<Heap<T>>,
    not_empty: Condvar,
    compare: Comparator<T>,
    broken_put: std::sync::atomic::AtomicBool,
}

impl<T: Ord + Send> PriorityBlockingQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(|a, b| a.cmp(b))
    }
}

impl<T: Send> PriorityBlockingQueue<T> {
    /// Creates a queue ordered by `compare`: the element for which `compare`
    /// reports the smallest value sits at the head.
    pub fn with_comparator(compare: impl Fn(&T, &T) -> Ordering + Send + Sync + 'static) -> Self {
        Self {
            heap: Mutex::new(Heap {
                data: Vec::new(),
                broken: false,
            }),
            not_empty: Condvar::new(),
            compare: Box::new(compare),
            broken_put: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Heap<T>> {
        self.heap.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn less(&self, a: &T, b: &T) -> bool {
        (self.compare)(a, b) == Ordering::Less
    }

    fn sift_up(&self, data: &mut [T], mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.less(&data[i], &data[parent]) {
                data.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&self, data: &mut [T], mut i: usize) {
        let len = data.len();
        loop {
            let left = 2 * i + 1;
            let right = 2 * i + 2;
            let mut smallest = i;
            if left < len && self.less(&data[left], &data[smallest]) {
                smallest = left;
            }
            if right < len && self.less(&data[right], &data[smallest]) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            data.swap(i, smallest);
            i = smallest;
        }
    }

    /// Permanently closes the queue; see [`LinkedBlockingQueue::close`].
    ///
    /// [`LinkedBlockingQueue::close`]: super::LinkedBlockingQueue::close
    pub fn close(&self) {
        self.broken_put.store(true, std::sync::atomic::Ordering::SeqCst);
        let mut heap = self.lock();
        heap.broken = true;
        self.not_empty.notify_all();
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.lock().broken
    }

    fn do_offer(&self, item: T) -> Result<bool> {
        let mut heap = self.lock();
        if heap.broken {
            return Err(ThreadPoolError::QueueBroken);
        }
        heap.data.push(item);
        let last = heap.data.len() - 1;
        self.sift_up(&mut heap.data, last);
        drop(heap);
        self.not_empty.notify_one();
        Ok(true)
    }

    fn do_poll(&self) -> Option<T> {
        let mut heap = self.lock();
        self.pop_locked(&mut heap)
    }

    fn pop_locked(&self, heap: &mut Heap<T>) -> Option<T> {
        if heap.data.is_empty() {
            return None;
        }
        let last = heap.data.len() - 1;
        heap.data.swap(0, last);
        let item = heap.data.pop();
        if !heap.data.is_empty() {
            self.sift_down(&mut heap.data, 0);
        }
        item
    }

    /// Inspects the minimal element without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.lock().data.first().cloned()
    }

    /// Removes a specific element by linear scan, then restores the heap
    /// invariant by sifting both directions from the vacated slot.
    pub fn remove(&self, item: &T) -> bool
    where
        T: PartialEq,
    {
        let mut heap = self.lock();
        if let Some(pos) = heap.data.iter().position(|v| v == item) {
            let last = heap.data.len() - 1;
            heap.data.swap(pos, last);
            heap.data.pop();
            if pos < heap.data.len() {
                self.sift_down(&mut heap.data, pos);
                self.sift_up(&mut heap.data, pos);
            }
            true
        } else {
            false
        }
    }

    /// Atomically moves up to `max` elements satisfying `predicate` out of
    /// the queue, invoking `action` on each, and returns the number
    /// removed. Unlike the FIFO queues' `drain`, order among removed
    /// elements is heap storage order, not priority order — restoring the
    /// heap invariant after an arbitrary removal already requires a full
    /// re-heapify, so there is no extra cost to also reporting them in
    /// priority order, but nothing in the contract promises it either.
    pub fn drain(
        &self,
        mut action: impl FnMut(T),
        max: usize,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> usize {
        let mut heap = self.lock();
        let mut removed = 0usize;
        let mut kept = Vec::with_capacity(heap.data.len());
        for item in heap.data.drain(..) {
            if removed < max && predicate(&item) {
                removed += 1;
                action(item);
            } else {
                kept.push(item);
            }
        }
        heap.data = kept;
        if !heap.data.is_empty() {
            for i in (0..heap.data.len() / 2).rev() {
                self.sift_down(&mut heap.data, i);
            }
        }
        removed
    }
}

impl<T: Ord + Send> Default for PriorityBlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> BlockingQueue<T> for PriorityBlockingQueue<T> {
    fn offer(&self, item: T) -> Result<bool> {
        self.do_offer(item)
    }

    fn offer_timeout(&self, item: T, _timeout: Duration) -> Result<bool> {
        // Unbounded: identical to `offer`, never blocks for space.
        self.do_offer(item)
    }

    fn put(&self, item: T) -> Result<()> {
        self.do_offer(item).map(|_| ())
    }

    fn poll(&self) -> Result<Option<T>> {
        Ok(self.do_poll())
    }

    fn poll_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let deadline = super::deadline_from(timeout);
        let mut heap = self.lock();
        loop {
            if let Some(item) = self.pop_locked(&mut heap) {
                return Ok(Some(item));
            }
            if heap.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let (guard, timed_out) = self
                .not_empty
                .wait_timeout(heap, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            heap = guard;
            if timed_out.timed_out() && heap.data.is_empty() {
                return Ok(None);
            }
        }
    }

    fn take(&self) -> Result<T> {
        let mut heap = self.lock();
        loop {
            if let Some(item) = self.pop_locked(&mut heap) {
                return Ok(item);
            }
            if heap.broken {
                return Err(ThreadPoolError::QueueBroken);
            }
            heap = self
                .not_empty
                .wait(heap)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
    }

    fn len(&self) -> usize {
        self.lock().data.len()
    }

    fn remaining_capacity(&self) -> usize {
        usize::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_returns_ascending_order() {
        let q: PriorityBlockingQueue<i32> = PriorityBlockingQueue::new();
        for v in [5, 1, 3] {
            q.offer(v).unwrap();
        }
        assert_eq!(q.poll().unwrap(), Some(1));
        assert_eq!(q.poll().unwrap(), Some(3));
        assert_eq!(q.poll().unwrap(), Some(5));
        assert_eq!(q.poll().unwrap(), None);
    }

    #[test]
    fn remove_restores_heap_invariant() {
        let q: PriorityBlockingQueue<i32> = PriorityBlockingQueue::new();
        for v in [9, 4, 7, 1, 8, 2, 6, 3, 5] {
            q.offer(v).unwrap();
        }
        assert!(q.remove(&4));
        let mut out = Vec::new();
        while let Some(v) = q.poll().unwrap() {
            out.push(v);
        }
        assert_eq!(out, vec![1, 2, 3, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn drain_removes_matching_elements_and_keeps_invariant() {
        let q: PriorityBlockingQueue<i32> = PriorityBlockingQueue::new();
        for v in [9, 4, 7, 1, 8, 2, 6, 3, 5] {
            q.offer(v).unwrap();
        }
        let mut drained = Vec::new();
        let removed = q.drain(|v| drained.push(v), usize::MAX, |v| v % 2 == 0);
        drained.sort_unstable();
        assert_eq!(removed, 4);
        assert_eq!(drained, vec![2, 4, 6, 8]);

        let mut out = Vec::new();
        while let Some(v) = q.poll().unwrap() {
            out.push(v);
        }
        assert_eq!(out, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn drain_respects_max() {
        let q: PriorityBlockingQueue<i32> = PriorityBlockingQueue::new();
        for v in [1, 2, 3, 4, 5] {
            q.offer(v).unwrap();
        }
        let mut drained = Vec::new();
        let removed = q.drain(|v| drained.push(v), 2, |_| true);
        assert_eq!(removed, 2);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn custom_comparator_max_heap() {
        let q: PriorityBlockingQueue<i32> =
            PriorityBlockingQueue::with_comparator(|a, b| b.cmp(a));
        for v in [5, 1, 3] {
            q.offer(v).unwrap();
        }
        assert_eq!(q.poll().unwrap(), Some(5));
        assert_eq!(q.poll().unwrap(), Some(3));
        assert_eq!(q.poll().unwrap(), Some(1));
    }
}
