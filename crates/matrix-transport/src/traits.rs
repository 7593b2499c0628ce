// SPDX-License-Identifier: Apache-2.0

use crate::error::TransportError;
use crate::urn::Urn;

/// Invoked on a transport-internal thread for every publication matching a
/// subscribed key. Callbacks must be non-blocking or very short: they run
/// on the thread that owns the subscriber socket (or, for `rtinproc`, on
/// the publisher's own thread) and a slow callback stalls every other
/// subscription sharing that thread.
pub type SubscriberCallback = Box<dyn FnMut(&str, &[u8]) + Send>;

/// The publishing half of a transport. One instance is shared by every
/// `DataSource`/Keymaster-server publisher bound to the same
/// `(component, logical transport key)`.
pub trait ServerTransport: Send + Sync {
    /// Binds the given (possibly partial) URNs and returns the concrete
    /// URNs actually bound, in the same order. Idempotent: a second call
    /// with the transport already bound returns the previously bound URNs.
    fn bind(&self, urns: &[Urn]) -> Result<Vec<Urn>, TransportError>;

    /// Routes `bytes` to every subscriber whose subscription key matches
    /// `key`.
    fn publish(&self, key: &str, bytes: &[u8]) -> Result<(), TransportError>;
}

/// The subscribing half of a transport. One instance is shared by every
/// `DataSink`/Keymaster-client subscriber connected to the same URN.
pub trait ClientTransport: Send + Sync {
    fn connect(&self, urn: &Urn) -> Result<(), TransportError>;

    /// Registers `callback` for `key`. Replaces any previous callback for
    /// the same key.
    fn subscribe(&self, key: &str, callback: SubscriberCallback) -> Result<(), TransportError>;

    fn unsubscribe(&self, key: &str) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;
}
