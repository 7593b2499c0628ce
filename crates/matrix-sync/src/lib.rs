// SPDX-License-Identifier: Apache-2.0

//! Thread synchronization primitives shared by the rest of the Matrix
//! runtime.
//!
//! Everything here is built directly on `std::sync::{Mutex, Condvar}`. The
//! runtime's threading model is plain OS threads with blocking calls, not an
//! event loop, so these primitives surface timeouts as `bool`/`Option`
//! returns rather than futures.
//!
//! - [`SemFifo`] is the bounded MPMC queue behind every `DataSink` and the
//!   Keymaster's publish-snapshot handoff.
//! - [`ConditionCell`] is a mutex + condition variable guarding a single
//!   typed value, used for heartbeats, run flags, and the poller.

mod condition_cell;
mod semaphore_fifo;

pub use condition_cell::ConditionCell;
pub use semaphore_fifo::SemFifo;
