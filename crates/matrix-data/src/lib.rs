// SPDX-License-Identifier: Apache-2.0

//! Typed producer/consumer endpoints layered on the transport registry
//! (spec.md §4.6).
//!
//! [`DataSource<T>`] discovers its logical transport through the Keymaster
//! at construction and publishes `T` values; [`DataSink<T, Sel>`] resolves
//! a producer's configured URN (per a [`TransportSelector`] policy),
//! subscribes, and delivers decoded values into a bounded FIFO. [`Poller`]
//! watches a set of sinks without busy-polling each one, and
//! [`reconnect::reconcile`] heals a sink whose producer moved after a
//! Keymaster or producer restart.

mod codec;
mod error;
mod poller;
mod reconnect;
mod selector;
mod sink;
mod source;

pub use codec::{Decode, Encode};
pub use error::DataError;
pub use poller::{PollableSink, Poller};
pub use reconnect::reconcile;
pub use selector::{SelectOnly, SelectSpecified, TransportSelector};
pub use sink::DataSink;
pub use source::DataSource;
