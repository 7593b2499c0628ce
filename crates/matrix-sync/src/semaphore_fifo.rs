// SPDX-License-Identifier: Apache-2.0

//! Bounded MPMC queue with blocking, non-blocking, and timed put/get.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const SEMFIFO_TAG: &str = "SemFifo:";

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    released: bool,
    notifier: Option<Box<dyn FnMut(usize) + Send>>,
    total_put: u64,
    total_got: u64,
    total_dropped: u64,
}

/// A bounded, thread-safe FIFO of `T`.
///
/// `release()` is the sanctioned way to shut one of these down: every
/// blocked and every future blocking call returns `false`/`None` once
/// released, rather than hanging. The notifier, if set, runs after every
/// successful `put*` with the post-insert size; the multi-sink [poller][super]
/// uses it to wake on any-of/all-of.
pub struct SemFifo<T> {
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> SemFifo<T> {
    /// Creates a FIFO bounded at `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                released: false,
                notifier: None,
                total_put: 0,
                total_got: 0,
                total_dropped: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Installs a callback invoked (on the putting thread) after every
    /// successful put, with the size of the queue just after insertion.
    pub fn set_notifier<F>(&self, notifier: F)
    where
        F: FnMut(usize) + Send + 'static,
    {
        let mut inner = self.inner.lock().unwrap();
        inner.notifier = Some(Box::new(notifier));
    }

    fn notify_put(inner: &mut Inner<T>) {
        inner.total_put += 1;
        let size = inner.queue.len();
        if let Some(notifier) = inner.notifier.as_mut() {
            notifier(size);
        }
    }

    /// Blocks until there is room, then pushes `item`. Returns `false`
    /// without pushing if the FIFO was released while waiting.
    pub fn put(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.released {
                return false;
            }
            if inner.queue.len() < inner.capacity {
                inner.queue.push_back(item);
                Self::notify_put(&mut inner);
                self.not_empty.notify_one();
                return true;
            }
            inner = self.not_full.wait(inner).unwrap();
        }
    }

    /// Pushes `item` if there is room right now, otherwise returns `false`.
    pub fn try_put(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.released || inner.queue.len() >= inner.capacity {
            return false;
        }
        inner.queue.push_back(item);
        Self::notify_put(&mut inner);
        self.not_empty.notify_one();
        true
    }

    /// Like [`put`][Self::put], but gives up and returns `false` after
    /// `timeout` if no room opened up.
    pub fn timed_put(&self, item: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.released {
                return false;
            }
            if inner.queue.len() < inner.capacity {
                inner.queue.push_back(item);
                Self::notify_put(&mut inner);
                self.not_empty.notify_one();
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, timeout_result) =
                self.not_full.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.queue.len() >= inner.capacity {
                return false;
            }
        }
    }

    /// Never blocks: if the FIFO is full, drops the oldest items until
    /// `item` fits, then pushes it. Returns the number of items dropped.
    pub fn put_no_block(&self, item: T) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut dropped = 0usize;
        while inner.queue.len() >= inner.capacity {
            if inner.queue.pop_front().is_some() {
                dropped += 1;
                inner.total_dropped += 1;
            } else {
                break;
            }
        }
        inner.queue.push_back(item);
        Self::notify_put(&mut inner);
        self.not_empty.notify_one();
        if dropped > 0 {
            tracing::warn!(
                "{SEMFIFO_TAG} put_no_block dropped {dropped} oldest item(s) to make room"
            );
        }
        dropped
    }

    /// Blocks until an item is available, returning `None` if released.
    pub fn get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                inner.total_got += 1;
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.released {
                return None;
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Pops an item if one is available right now, otherwise `None`.
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let item = inner.queue.pop_front();
        if item.is_some() {
            inner.total_got += 1;
            self.not_full.notify_one();
        }
        item
    }

    /// Like [`get`][Self::get], but gives up after `timeout`.
    pub fn timed_get(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                inner.total_got += 1;
                self.not_full.notify_one();
                return Some(item);
            }
            if inner.released {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.not_empty.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
        }
    }

    /// Drops `n` oldest items (`n >= 0`), or keeps only the `|n|` newest
    /// items (`n < 0`). Never blocks.
    pub fn flush(&self, n: isize) {
        let mut inner = self.inner.lock().unwrap();
        if n >= 0 {
            let n = n as usize;
            for _ in 0..n {
                if inner.queue.pop_front().is_some() {
                    inner.total_dropped += 1;
                } else {
                    break;
                }
            }
        } else {
            let keep = (-n) as usize;
            while inner.queue.len() > keep {
                if inner.queue.pop_front().is_some() {
                    inner.total_dropped += 1;
                } else {
                    break;
                }
            }
        }
        self.not_full.notify_all();
    }

    /// Current number of items queued.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// Changes the capacity. Shrinking below the current size does not drop
    /// items; it simply blocks further `put`s until the size drains below
    /// the new capacity.
    pub fn resize(&self, new_capacity: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.capacity = new_capacity;
        self.not_full.notify_all();
    }

    /// Wakes every blocked caller and marks the FIFO released: all current
    /// and future blocking calls return `false`/`None` immediately.
    pub fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.released = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    /// Blocks until the FIFO is empty (or released).
    pub fn wait_for_empty(&self) {
        let mut inner = self.inner.lock().unwrap();
        while !inner.queue.is_empty() && !inner.released {
            inner = self.not_full.wait(inner).unwrap();
        }
    }

    /// Total items ever accepted by a `put*` call (for invariant checks).
    pub fn total_put(&self) -> u64 {
        self.inner.lock().unwrap().total_put
    }

    /// Total items ever removed by a `get*` call.
    pub fn total_got(&self) -> u64 {
        self.inner.lock().unwrap().total_got
    }

    /// Total items ever discarded by `put_no_block` or `flush`.
    pub fn total_dropped(&self) -> u64 {
        self.inner.lock().unwrap().total_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::SemFifo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn put_and_get_preserve_order() {
        let fifo = SemFifo::new(4);
        assert!(fifo.put(1));
        assert!(fifo.put(2));
        assert!(fifo.put(3));
        assert_eq!(fifo.get(), Some(1));
        assert_eq!(fifo.get(), Some(2));
        assert_eq!(fifo.get(), Some(3));
    }

    #[test]
    fn try_put_fails_when_full() {
        let fifo = SemFifo::new(2);
        assert!(fifo.try_put(1));
        assert!(fifo.try_put(2));
        assert!(!fifo.try_put(3));
        assert_eq!(fifo.size(), 2);
    }

    #[test]
    fn try_get_fails_when_empty() {
        let fifo: SemFifo<i32> = SemFifo::new(2);
        assert_eq!(fifo.try_get(), None);
    }

    #[test]
    fn timed_put_times_out_when_full() {
        let fifo = SemFifo::new(1);
        assert!(fifo.put(1));
        let start = std::time::Instant::now();
        assert!(!fifo.timed_put(2, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn timed_get_times_out_when_empty() {
        let fifo: SemFifo<i32> = SemFifo::new(1);
        assert_eq!(fifo.timed_get(Duration::from_millis(20)), None);
    }

    #[test]
    fn put_no_block_drops_oldest_and_reports_count() {
        let fifo = SemFifo::new(3);
        fifo.put(1);
        fifo.put(2);
        fifo.put(3);
        let dropped = fifo.put_no_block(4);
        assert_eq!(dropped, 1);
        assert_eq!(fifo.size(), 3);
        assert_eq!(fifo.get(), Some(2));
        assert_eq!(fifo.get(), Some(3));
        assert_eq!(fifo.get(), Some(4));
    }

    #[test]
    fn flush_positive_drops_oldest() {
        // Scenario F from the end-to-end table: flush(3) on [1,2,3,4,5]
        // leaves [4,5].
        let fifo = SemFifo::new(8);
        for v in 1..=5 {
            fifo.put(v);
        }
        fifo.flush(3);
        assert_eq!(fifo.get(), Some(4));
        assert_eq!(fifo.get(), Some(5));
        assert_eq!(fifo.try_get(), None);
    }

    #[test]
    fn flush_negative_keeps_newest() {
        let fifo = SemFifo::new(8);
        for v in 1..=5 {
            fifo.put(v);
        }
        fifo.flush(-2);
        assert_eq!(fifo.get(), Some(4));
        assert_eq!(fifo.get(), Some(5));
        assert_eq!(fifo.try_get(), None);
    }

    #[test]
    fn release_unblocks_waiters() {
        let fifo: Arc<SemFifo<i32>> = Arc::new(SemFifo::new(1));
        let fifo_thread = fifo.clone();
        let handle = thread::spawn(move || fifo_thread.get());
        thread::sleep(Duration::from_millis(20));
        fifo.release();
        assert_eq!(handle.join().unwrap(), None);
        assert!(!fifo.put(1));
        assert_eq!(fifo.get(), None);
    }

    #[test]
    fn notifier_runs_after_successful_put() {
        let fifo = SemFifo::new(4);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        fifo.set_notifier(move |size| {
            seen_clone.store(size, Ordering::SeqCst);
        });
        fifo.put(10);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        fifo.put(11);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn size_never_exceeds_capacity_under_interleaving() {
        let fifo = Arc::new(SemFifo::new(4));
        let mut handles = Vec::new();
        for i in 0..4 {
            let fifo = fifo.clone();
            handles.push(thread::spawn(move || {
                for v in 0..50 {
                    fifo.put(i * 100 + v);
                }
            }));
        }
        let drainer_fifo = fifo.clone();
        let drainer = thread::spawn(move || {
            let mut got = 0;
            while got < 200 {
                if drainer_fifo.get().is_some() {
                    got += 1;
                }
            }
        });
        for h in handles {
            h.join().unwrap();
        }
        drainer.join().unwrap();
        assert_eq!(fifo.size(), 0);
        assert_eq!(fifo.total_put() - fifo.total_got() - fifo.total_dropped(), 0);
    }
}
