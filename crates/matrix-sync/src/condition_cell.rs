// SPDX-License-Identifier: Apache-2.0

//! A typed value protected by a mutex and condition variable.

use std::sync::{Mutex, MutexGuard};
use std::sync::Condvar;
use std::time::{Duration, Instant};

/// Mutex + condition variable holding a value of type `T`.
///
/// Does not expose the raw `Condvar`: every wait goes through one of the
/// methods below, so callers can't deadlock by mixing manual locking with
/// the cell's own notifications.
pub struct ConditionCell<T> {
    value: Mutex<T>,
    cv: Condvar,
}

impl<T: Clone + PartialEq> ConditionCell<T> {
    /// Creates a cell holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            cv: Condvar::new(),
        }
    }

    /// Returns a copy of the current value.
    pub fn get_value(&self) -> T {
        self.value.lock().unwrap().clone()
    }

    /// Sets the value without waking anyone.
    pub fn set_value(&self, v: T) {
        *self.value.lock().unwrap() = v;
    }

    /// Wakes one waiter without changing the value.
    pub fn signal(&self) {
        self.cv.notify_one();
    }

    /// Sets the value and wakes one waiter.
    pub fn signal_value(&self, v: T) {
        *self.value.lock().unwrap() = v;
        self.cv.notify_one();
    }

    /// Wakes every waiter without changing the value.
    pub fn broadcast(&self) {
        self.cv.notify_all();
    }

    /// Sets the value and wakes every waiter.
    pub fn broadcast_value(&self, v: T) {
        *self.value.lock().unwrap() = v;
        self.cv.notify_all();
    }

    /// Blocks until the value equals `target`.
    pub fn wait(&self, target: T) {
        let mut guard = self.value.lock().unwrap();
        while *guard != target {
            guard = self.cv.wait(guard).unwrap();
        }
    }

    /// Blocks until the value equals `target` or `timeout` elapses.
    /// Returns whether the value reached `target`.
    pub fn wait_timeout(&self, target: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.value.lock().unwrap();
        while *guard != target {
            let now = Instant::now();
            if now >= deadline {
                return *guard == target;
            }
            let (g, _) = self.cv.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
        }
        true
    }

    /// Blocks until the value equals `target`, returning the still-held
    /// lock so the caller can test-and-modify atomically.
    pub fn wait_with_lock(&self, target: T) -> MutexGuard<'_, T> {
        let mut guard = self.value.lock().unwrap();
        while *guard != target {
            guard = self.cv.wait(guard).unwrap();
        }
        guard
    }

    /// Like [`wait_with_lock`][Self::wait_with_lock], but gives up after
    /// `timeout`. Returns `None` (lock released) on timeout.
    pub fn wait_with_lock_timeout(&self, target: T, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.value.lock().unwrap();
        while *guard != target {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _) = self.cv.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
        }
        Some(guard)
    }

    /// Blocks until the next signal/broadcast or `timeout` elapses, with no
    /// comparison against any target value. Returns the held lock either
    /// way so the caller can inspect the value itself.
    pub fn wait_locked_with_timeout(&self, timeout: Duration) -> MutexGuard<'_, T> {
        let guard = self.value.lock().unwrap();
        let (g, _) = self.cv.wait_timeout(guard, timeout).unwrap();
        g
    }
}

#[cfg(test)]
mod tests {
    use super::ConditionCell;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_once_target_value_set() {
        let cell = Arc::new(ConditionCell::new(false));
        let cell_thread = cell.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cell_thread.signal_value(true);
        });
        cell.wait(true);
        handle.join().unwrap();
        assert!(cell.get_value());
    }

    #[test]
    fn wait_timeout_returns_false_when_value_never_reached() {
        let cell = ConditionCell::new(0);
        assert!(!cell.wait_timeout(1, Duration::from_millis(20)));
    }

    #[test]
    fn wait_with_lock_allows_atomic_test_and_modify() {
        let cell = Arc::new(ConditionCell::new(0));
        let cell_thread = cell.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cell_thread.signal_value(5);
        });
        {
            let mut guard = cell.wait_with_lock(5);
            *guard = 6;
        }
        handle.join().unwrap();
        assert_eq!(cell.get_value(), 6);
    }

    #[test]
    fn broadcast_wakes_all_waiters() {
        let cell = Arc::new(ConditionCell::new(false));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let cell = cell.clone();
            handles.push(thread::spawn(move || cell.wait(true)));
        }
        thread::sleep(Duration::from_millis(20));
        cell.broadcast_value(true);
        for h in handles {
            h.join().unwrap();
        }
    }
}
