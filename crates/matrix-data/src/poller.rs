// SPDX-License-Identifier: Apache-2.0

//! A poller watches a set of sinks and wakes when any (or all) of them
//! have data, without the caller having to busy-poll each sink's FIFO.

use std::sync::Arc;
use std::time::{Duration, Instant};

use matrix_sync::ConditionCell;

use crate::codec::Decode;
use crate::selector::TransportSelector;
use crate::sink::DataSink;

/// A type-erased handle a [`Poller`] can watch, implemented by every
/// [`DataSink`].
pub trait PollableSink: Send + Sync {
    fn has_data(&self) -> bool;
    fn attach_notifier(&self, on_post: Arc<dyn Fn() + Send + Sync>);
}

impl<T, Sel> PollableSink for DataSink<T, Sel>
where
    T: Decode + Send + 'static,
    Sel: TransportSelector + Send + Sync,
{
    fn has_data(&self) -> bool {
        self.fifo().size() > 0
    }

    fn attach_notifier(&self, on_post: Arc<dyn Fn() + Send + Sync>) {
        self.fifo().set_notifier(Box::new(move |_size| on_post()));
    }
}

/// Watches a set of [`PollableSink`]s through a shared condition cell: each
/// sink's FIFO notifier bumps a generation counter, which wakes whichever
/// of `any_of`/`all_of` is currently blocked.
pub struct Poller {
    sinks: Vec<Arc<dyn PollableSink>>,
    generation: Arc<ConditionCell<u64>>,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            generation: Arc::new(ConditionCell::new(0)),
        }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn PollableSink>) {
        let generation = self.generation.clone();
        sink.attach_notifier(Arc::new(move || {
            let next = generation.get_value().wrapping_add(1);
            generation.signal_value(next);
        }));
        self.sinks.push(sink);
    }

    /// Blocks until at least one watched sink has data, or `timeout`
    /// elapses. Returns whether any sink had data.
    pub fn any_of(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |sinks| sinks.iter().any(|s| s.has_data()))
    }

    /// Blocks until every watched sink has data, or `timeout` elapses.
    pub fn all_of(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |sinks| {
            !sinks.is_empty() && sinks.iter().all(|s| s.has_data())
        })
    }

    fn wait_for(&self, timeout: Duration, predicate: impl Fn(&[Arc<dyn PollableSink>]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.sinks) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return predicate(&self.sinks);
            }
            let _ = self.generation.wait_locked_with_timeout(deadline - now);
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}
