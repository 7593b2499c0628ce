// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks the most recently observed Keymaster server heartbeat. Meant to
/// be registered as a subscription callback on [`HEARTBEAT_KEY`][crate::wire::HEARTBEAT_KEY];
/// the reconnect helper and clients use [`is_alive`][Self::is_alive] to
/// decide whether the server is still around before retrying a request.
pub struct HeartbeatWatcher {
    last_seen: Mutex<Option<Instant>>,
    last_value: Mutex<String>,
}

impl HeartbeatWatcher {
    pub fn new() -> Self {
        Self {
            last_seen: Mutex::new(None),
            last_value: Mutex::new(String::new()),
        }
    }

    /// Called by the subscription dispatch thread on every heartbeat
    /// publication.
    pub fn observe(&self, timestamp: &str) {
        *self.last_seen.lock().unwrap() = Some(Instant::now());
        *self.last_value.lock().unwrap() = timestamp.to_string();
    }

    /// The wall-clock string carried by the most recent heartbeat, if any
    /// has been observed yet.
    pub fn last_update(&self) -> Option<String> {
        let value = self.last_value.lock().unwrap();
        if value.is_empty() {
            None
        } else {
            Some(value.clone())
        }
    }

    /// True if a heartbeat has been seen within `within`. The reconnect
    /// helper uses a 5 second window.
    pub fn is_alive(&self, within: Duration) -> bool {
        match *self.last_seen.lock().unwrap() {
            Some(instant) => instant.elapsed() <= within,
            None => false,
        }
    }
}

impl Default for HeartbeatWatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_alive_until_first_observation() {
        let watcher = HeartbeatWatcher::new();
        assert!(!watcher.is_alive(Duration::from_secs(5)));
        assert!(watcher.last_update().is_none());
    }

    #[test]
    fn observe_marks_alive_within_window() {
        let watcher = HeartbeatWatcher::new();
        watcher.observe("2026-07-27T00:00:00Z");
        assert!(watcher.is_alive(Duration::from_secs(5)));
        assert_eq!(watcher.last_update().unwrap(), "2026-07-27T00:00:00Z");
    }
}
