// SPDX-License-Identifier: Apache-2.0

//! Process-wide interned registries of transports, reference-counted so
//! that components sharing the same logical transport or URN share the
//! same underlying socket. Modeled on the teacher's egress forwarder pool:
//! an `insert`/`remove` pair over a `Mutex<HashMap<K, (refcount, Arc<V>)>>`,
//! with the last `remove` disposing the entry. Our runtime is thread-based
//! rather than async, so the lock is a plain `std::sync::Mutex`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::rtinproc::{RtInprocClientTransport, RtInprocServerTransport};
use crate::traits::{ClientTransport, ServerTransport};
use crate::urn::{Scheme, Urn};
use crate::zmq_transport::{ZmqClientTransport, ZmqServerTransport};

/// Identifies a server transport: the owning component and its logical
/// transport key (the name under `components.<name>.Transports.<key>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub component: String,
    pub transport_key: String,
}

impl ServerKey {
    pub fn new(component: impl Into<String>, transport_key: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            transport_key: transport_key.into(),
        }
    }
}

struct ServerEntry {
    refcount: usize,
    transport: Arc<dyn ServerTransport>,
    bound: Vec<Urn>,
}

struct ClientEntry {
    refcount: usize,
    transport: Arc<dyn ClientTransport>,
}

lazy_static! {
    static ref SERVERS: Mutex<HashMap<ServerKey, ServerEntry>> = Mutex::new(HashMap::new());
    static ref CLIENTS: Mutex<HashMap<String, ClientEntry>> = Mutex::new(HashMap::new());
    static ref ZMQ_CONTEXT: zmq::Context = zmq::Context::new();
}

fn new_server_transport(scheme: Scheme) -> Arc<dyn ServerTransport> {
    match scheme {
        Scheme::RtInproc => Arc::new(RtInprocServerTransport::new()),
        Scheme::Inproc | Scheme::Ipc | Scheme::Tcp => {
            Arc::new(ZmqServerTransport::new(ZMQ_CONTEXT.clone()))
        }
    }
}

fn new_client_transport(scheme: Scheme) -> Result<Arc<dyn ClientTransport>, TransportError> {
    match scheme {
        Scheme::RtInproc => Ok(Arc::new(RtInprocClientTransport::new())),
        Scheme::Inproc | Scheme::Ipc | Scheme::Tcp => {
            Ok(Arc::new(ZmqClientTransport::new(ZMQ_CONTEXT.clone())?))
        }
    }
}

/// Returns the server transport for `key`, binding `urns` if this is the
/// first reference. Subsequent callers sharing `key` get the same
/// transport and the URNs it was originally bound with; `urns` is ignored
/// on a refcount-only acquire, matching the contract that binding happens
/// once per logical transport.
pub fn get_server_transport(
    key: &ServerKey,
    scheme: Scheme,
    urns: &[Urn],
) -> Result<(Arc<dyn ServerTransport>, Vec<Urn>), TransportError> {
    let mut servers = SERVERS.lock().unwrap();
    if let Some(entry) = servers.get_mut(key) {
        entry.refcount += 1;
        return Ok((entry.transport.clone(), entry.bound.clone()));
    }

    let transport = new_server_transport(scheme);
    let bound = transport.bind(urns)?;
    debug!(component = %key.component, transport_key = %key.transport_key, ?bound, "bound server transport");
    servers.insert(
        key.clone(),
        ServerEntry {
            refcount: 1,
            transport: transport.clone(),
            bound: bound.clone(),
        },
    );
    Ok((transport, bound))
}

/// Drops one reference to the server transport for `key`, disposing it
/// once the last reference is released.
pub fn release_server_transport(key: &ServerKey) {
    let mut servers = SERVERS.lock().unwrap();
    let Some(entry) = servers.get_mut(key) else {
        warn!(component = %key.component, transport_key = %key.transport_key, "release_server_transport: no such transport");
        return;
    };
    entry.refcount -= 1;
    if entry.refcount == 0 {
        servers.remove(key);
        debug!(component = %key.component, transport_key = %key.transport_key, "disposed server transport");
    }
}

/// Returns the client transport connected to `urn`, connecting if this is
/// the first reference.
pub fn get_client_transport(urn: &Urn) -> Result<Arc<dyn ClientTransport>, TransportError> {
    let mut clients = CLIENTS.lock().unwrap();
    if let Some(entry) = clients.get_mut(&urn.to_string()) {
        entry.refcount += 1;
        return Ok(entry.transport.clone());
    }

    let transport = new_client_transport(urn.scheme)?;
    transport.connect(urn)?;
    debug!(%urn, "connected client transport");
    clients.insert(
        urn.to_string(),
        ClientEntry {
            refcount: 1,
            transport: transport.clone(),
        },
    );
    Ok(transport)
}

/// Drops one reference to the client transport for `urn`, disconnecting
/// and disposing it once the last reference is released.
pub fn release_client_transport(urn: &Urn) {
    let mut clients = CLIENTS.lock().unwrap();
    let key = urn.to_string();
    let Some(entry) = clients.get_mut(&key) else {
        warn!(%urn, "release_client_transport: no such transport");
        return;
    };
    entry.refcount -= 1;
    if entry.refcount == 0 {
        let _ = entry.transport.disconnect();
        clients.remove(&key);
        debug!(%urn, "disposed client transport");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_get_server_transport_shares_and_refcounts() {
        let key = ServerKey::new("comp-a", "logical-1");
        let urn = Urn::new(Scheme::RtInproc, "XXXXX");

        let (first, _) = get_server_transport(&key, Scheme::RtInproc, &[urn.clone()]).unwrap();
        let (second, _) = get_server_transport(&key, Scheme::RtInproc, &[urn]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        release_server_transport(&key);
        release_server_transport(&key);
    }

    #[test]
    fn release_past_last_reference_disposes_entry() {
        let key = ServerKey::new("comp-b", "logical-2");
        let urn = Urn::new(Scheme::RtInproc, "XXXXX");
        get_server_transport(&key, Scheme::RtInproc, &[urn]).unwrap();
        release_server_transport(&key);

        // second release on an already-disposed key logs a warning but
        // must not panic
        release_server_transport(&key);
    }

    #[test]
    fn client_registry_shares_by_urn() {
        let server_key = ServerKey::new("comp-c", "logical-3");
        let (_, bound) =
            get_server_transport(&server_key, Scheme::RtInproc, &[Urn::new(Scheme::RtInproc, "XXXXX")])
                .unwrap();
        let urn = &bound[0];

        let a = get_client_transport(urn).unwrap();
        let b = get_client_transport(urn).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        release_client_transport(urn);
        release_client_transport(urn);
        release_server_transport(&server_key);
    }
}
