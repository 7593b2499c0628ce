// SPDX-License-Identifier: Apache-2.0

//! Pluggable transport registry.
//!
//! A transport is a pair of factories (server, client) registered under a
//! scheme name. `inproc`, `ipc`, and `tcp` are all backed by ZeroMQ
//! PUB/SUB sockets ([`zmq_transport`]); `rtinproc` is a pure in-process
//! hub ([`rtinproc`]) for the real-time hot path, never touching the
//! message-passing library. [`registry`] holds the two process-wide,
//! reference-counted intern tables (servers keyed by component/transport
//! key, clients keyed by URN) that let components sharing a logical
//! transport share its underlying socket.

mod error;
mod registry;
mod rtinproc;
mod traits;
mod urn;
mod zmq_transport;

pub use error::TransportError;
pub use registry::{
    get_client_transport, get_server_transport, release_client_transport,
    release_server_transport, ServerKey,
};
pub use traits::{ClientTransport, ServerTransport, SubscriberCallback};
pub use urn::{Scheme, Urn};
