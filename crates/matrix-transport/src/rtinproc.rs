// SPDX-License-Identifier: Apache-2.0

//! The `rtinproc` transport: a process-local publish/subscribe hub with no
//! serialization across a kernel boundary, for the real-time hot path.
//! Publication invokes every matching subscriber callback synchronously on
//! the publisher's own thread, so a hub entry is shared, not owned, by its
//! server and clients.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;

use crate::error::TransportError;
use crate::traits::{ClientTransport, ServerTransport, SubscriberCallback};
use crate::urn::Urn;

#[derive(Default)]
struct Hub {
    subscribers: Mutex<HashMap<String, SubscriberCallback>>,
}

lazy_static! {
    static ref HUBS: Mutex<HashMap<String, Arc<Hub>>> = Mutex::new(HashMap::new());
}

fn hub_for(urn: &Urn) -> Arc<Hub> {
    HUBS.lock()
        .unwrap()
        .entry(urn.to_string())
        .or_insert_with(|| Arc::new(Hub::default()))
        .clone()
}

/// The "server" side of `rtinproc`: binding just creates (or finds) the
/// hub for the bound URN so subscribers have somewhere to register.
pub struct RtInprocServerTransport {
    hub: Mutex<Option<Arc<Hub>>>,
}

impl RtInprocServerTransport {
    pub fn new() -> Self {
        Self {
            hub: Mutex::new(None),
        }
    }
}

impl Default for RtInprocServerTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerTransport for RtInprocServerTransport {
    fn bind(&self, urns: &[Urn]) -> Result<Vec<Urn>, TransportError> {
        let concrete: Vec<Urn> = urns.iter().map(Urn::complete).collect();
        let primary = concrete
            .first()
            .cloned()
            .unwrap_or_else(|| Urn::new(crate::urn::Scheme::RtInproc, "XXXXX").complete());
        *self.hub.lock().unwrap() = Some(hub_for(&primary));
        Ok(concrete)
    }

    fn publish(&self, key: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let guard = self.hub.lock().unwrap();
        let hub = guard.as_ref().ok_or(TransportError::AlreadyReleased)?;
        let mut subscribers = hub.subscribers.lock().unwrap();
        if let Some(callback) = subscribers.get_mut(key) {
            callback(key, bytes);
        }
        Ok(())
    }
}

/// The "client" side of `rtinproc`: registers a callback directly in the
/// bound URN's hub. No background thread — the callback runs on whichever
/// thread calls `publish`.
pub struct RtInprocClientTransport {
    hub: Mutex<Option<Arc<Hub>>>,
    keys: Mutex<Vec<String>>,
}

impl RtInprocClientTransport {
    pub fn new() -> Self {
        Self {
            hub: Mutex::new(None),
            keys: Mutex::new(Vec::new()),
        }
    }
}

impl Default for RtInprocClientTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTransport for RtInprocClientTransport {
    fn connect(&self, urn: &Urn) -> Result<(), TransportError> {
        *self.hub.lock().unwrap() = Some(hub_for(urn));
        Ok(())
    }

    fn subscribe(&self, key: &str, callback: SubscriberCallback) -> Result<(), TransportError> {
        let guard = self.hub.lock().unwrap();
        let hub = guard.as_ref().ok_or(TransportError::AlreadyReleased)?;
        hub.subscribers
            .lock()
            .unwrap()
            .insert(key.to_string(), callback);
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }

    fn unsubscribe(&self, key: &str) -> Result<(), TransportError> {
        let guard = self.hub.lock().unwrap();
        let hub = guard.as_ref().ok_or(TransportError::AlreadyReleased)?;
        hub.subscribers.lock().unwrap().remove(key);
        self.keys.lock().unwrap().retain(|k| k != key);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        let guard = self.hub.lock().unwrap();
        if let Some(hub) = guard.as_ref() {
            let mut subscribers = hub.subscribers.lock().unwrap();
            for key in self.keys.lock().unwrap().drain(..) {
                subscribers.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn publish_invokes_subscriber_synchronously_on_caller_thread() {
        let urn = Urn::new(crate::urn::Scheme::RtInproc, "test-hub-1");
        let server = RtInprocServerTransport::new();
        server.bind(&[urn.clone()]).unwrap();

        let client = RtInprocClientTransport::new();
        client.connect(&urn).unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let received_cb = received.clone();
        client
            .subscribe("telemetry", Box::new(move |_key, _bytes| {
                received_cb.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        server.publish("telemetry", b"42").unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let urn = Urn::new(crate::urn::Scheme::RtInproc, "test-hub-2");
        let server = RtInprocServerTransport::new();
        server.bind(&[urn.clone()]).unwrap();
        let client = RtInprocClientTransport::new();
        client.connect(&urn).unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let received_cb = received.clone();
        client
            .subscribe("k", Box::new(move |_, _| {
                received_cb.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        client.unsubscribe("k").unwrap();
        server.publish("k", b"x").unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn publish_to_unsubscribed_key_is_a_no_op() {
        let urn = Urn::new(crate::urn::Scheme::RtInproc, "test-hub-3");
        let server = RtInprocServerTransport::new();
        server.bind(&[urn]).unwrap();
        assert!(server.publish("nobody-home", b"x").is_ok());
    }
}
