// SPDX-License-Identifier: Apache-2.0

//! The Keymaster: a hierarchical key/value store exposed over
//! request/reply (mutation) and publish/subscribe (change notification)
//! sockets.
//!
//! [`KeymasterServer`] owns the document and serves both sockets from two
//! dedicated threads. [`KeymasterClient`] is the other side: synchronous
//! `get`/`put`/`del`/`ping`, a background subscription thread, and an
//! optional dedicated put thread for fire-and-forget writes.

mod client;
mod error;
mod heartbeat;
mod server;
mod wire;

pub use client::{KeymasterClient, SubscriptionCallback};
pub use error::KeymasterError;
pub use heartbeat::HeartbeatWatcher;
pub use server::KeymasterServer;
pub use wire::{HEARTBEAT_KEY, PING_TOKEN};
