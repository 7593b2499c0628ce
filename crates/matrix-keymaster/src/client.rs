// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use matrix_keystore::{KmResult, Node};
use matrix_transport::Urn;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::KeymasterError;
use crate::wire::{self, Verb};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Invoked on the client's subscription thread for every publication whose
/// keychain falls under a subscribed prefix.
pub type SubscriptionCallback = Box<dyn FnMut(&str, &Node) + Send>;

struct SharedState {
    control_socket: Mutex<zmq::Socket>,
    timeout: Duration,
    last_result: Mutex<Option<KmResult>>,
}

/// A Keymaster client: a mutex-protected REQ socket for synchronous
/// `get`/`put`/`del`/`ping`, plus a background SUB-socket thread that
/// dispatches subscription callbacks.
///
/// `shared` marks a client obtained from a per-process intern table (for
/// components that want to reuse one client rather than open a fresh
/// socket per caller); this type itself does no interning; callers that
/// want it layer it on top with `Arc`.
pub struct KeymasterClient {
    shared: SharedState,
    is_shared: bool,
    control_urn: Urn,
    subscription_tx: Mutex<Option<mpsc::Sender<SubscriptionCommand>>>,
    subscription_handle: Mutex<Option<JoinHandle<()>>>,
    put_tx: Option<mpsc::Sender<PutCommand>>,
    put_handle: Option<JoinHandle<()>>,
}

enum SubscriptionCommand {
    Subscribe(String, SubscriptionCallback),
    Unsubscribe(String),
    Shutdown,
}

struct PutCommand {
    keychain: String,
    value: Node,
    create: bool,
}

impl KeymasterClient {
    /// Connects a REQ socket to `control_urn`. The SUB socket used for
    /// subscriptions is created lazily, on the first
    /// [`subscribe`][Self::subscribe] call, since discovering its URN
    /// itself requires a round trip through the control socket
    /// (`KeymasterServer.PUBURLS`). Pass `shared = true` when this instance
    /// will be vended from an interned registry and reused by multiple
    /// callers.
    pub fn connect(control_urn: &Urn, shared: bool) -> Result<Self, KeymasterError> {
        Self::connect_with_timeout(control_urn, shared, DEFAULT_TIMEOUT)
    }

    pub fn connect_with_timeout(
        control_urn: &Urn,
        shared: bool,
        timeout: Duration,
    ) -> Result<Self, KeymasterError> {
        let context = zmq::Context::new();

        let control_socket = context.socket(zmq::REQ).map_err(wrap_zmq)?;
        control_socket
            .set_rcvtimeo(timeout.as_millis() as i32)
            .map_err(wrap_zmq)?;
        control_socket
            .connect(&endpoint(control_urn))
            .map_err(wrap_zmq)?;

        Ok(Self {
            shared: SharedState {
                control_socket: Mutex::new(control_socket),
                timeout,
                last_result: Mutex::new(None),
            },
            is_shared: shared,
            control_urn: control_urn.clone(),
            subscription_tx: Mutex::new(None),
            subscription_handle: Mutex::new(None),
            put_tx: None,
            put_handle: None,
        })
    }

    /// Resolves the publish socket's URN and starts the subscription
    /// thread, if it isn't already running.
    fn ensure_subscription_thread(&self) -> Result<mpsc::Sender<SubscriptionCommand>, KeymasterError> {
        let mut guard = self.subscription_tx.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let publish_urns = self.get("KeymasterServer.PUBURLS")?;
        let first = publish_urns
            .as_sequence()
            .and_then(|seq| seq.first())
            .and_then(|n| n.as_scalar())
            .ok_or_else(|| KeymasterError::Decode("KeymasterServer.PUBURLS is empty".to_string()))?;
        let publish_urn = Urn::parse(first).map_err(KeymasterError::Construction)?;

        let context = zmq::Context::new();
        let sub_socket = context.socket(zmq::SUB).map_err(wrap_zmq)?;
        sub_socket
            .connect(&endpoint(&publish_urn))
            .map_err(wrap_zmq)?;

        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("matrix-keymaster-client-sub".into())
            .spawn(move || subscription_loop(sub_socket, rx))
            .expect("spawn keymaster client subscription thread");

        *guard = Some(tx.clone());
        *self.subscription_handle.lock().unwrap() = Some(handle);
        Ok(tx)
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    /// The result of the most recent `get`/`put`/`del`/`ping` call.
    pub fn last_result(&self) -> Option<KmResult> {
        self.shared.last_result.lock().unwrap().clone()
    }

    pub fn ping(&self) -> Result<(), KeymasterError> {
        self.round_trip(Verb::Ping).map(|_| ())
    }

    pub fn get(&self, keychain: &str) -> Result<Node, KeymasterError> {
        self.round_trip(Verb::Get {
            keychain: keychain.to_string(),
        })
    }

    /// Convenience wrapper over [`get`][Self::get] that decodes the
    /// returned subtree into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, keychain: &str) -> Result<T, KeymasterError> {
        let node = self.get(keychain)?;
        let text = serde_yaml::to_string(&node).map_err(|e| KeymasterError::Decode(e.to_string()))?;
        serde_yaml::from_str(&text).map_err(|e| KeymasterError::Decode(e.to_string()))
    }

    pub fn put(&self, keychain: &str, value: Node, create: bool) -> Result<Node, KeymasterError> {
        let value_text = serde_yaml::to_string(&value).map_err(|e| KeymasterError::Decode(e.to_string()))?;
        self.round_trip(Verb::Put {
            keychain: keychain.to_string(),
            value: value_text,
            create,
        })
    }

    pub fn del(&self, keychain: &str) -> Result<Node, KeymasterError> {
        self.round_trip(Verb::Del {
            keychain: keychain.to_string(),
        })
    }

    fn round_trip(&self, verb: Verb) -> Result<Node, KeymasterError> {
        let socket = self.shared.control_socket.lock().unwrap();
        let frames = verb.into_frames();

        for (i, frame) in frames.iter().enumerate() {
            let more = if i + 1 < frames.len() { zmq::SNDMORE } else { 0 };
            socket.send(frame.as_str(), more).map_err(wrap_zmq)?;
        }

        let reply = socket.recv_string(0).map_err(wrap_zmq)?.map_err(|_| {
            KeymasterError::Decode("reply was not valid UTF-8".to_string())
        })?;
        let result = wire::decode_result(&reply)?;
        *self.shared.last_result.lock().unwrap() = Some(result.clone());

        if !result.ok {
            return Err(KeymasterError::protocol(result));
        }
        Ok(result.returned_node)
    }

    /// Lazily starts the dedicated put thread used for fire-and-forget
    /// writes, so callers on time-critical threads never block on the
    /// control socket. Safe to call more than once.
    pub fn enable_put_no_block(&mut self) -> Result<(), KeymasterError> {
        if self.put_tx.is_some() {
            return Ok(());
        }
        let context = zmq::Context::new();
        let socket = context.socket(zmq::REQ).map_err(wrap_zmq)?;
        socket
            .set_rcvtimeo(self.shared.timeout.as_millis() as i32)
            .map_err(wrap_zmq)?;
        socket
            .connect(&endpoint(&self.control_urn))
            .map_err(wrap_zmq)?;

        let (tx, rx) = mpsc::channel::<PutCommand>();
        let handle = thread::Builder::new()
            .name("matrix-keymaster-client-put".into())
            .spawn(move || put_loop(socket, rx))
            .expect("spawn keymaster client put thread");

        self.put_tx = Some(tx);
        self.put_handle = Some(handle);
        Ok(())
    }

    /// Queues a write for the dedicated put thread; returns immediately.
    /// Requires [`enable_put_no_block`][Self::enable_put_no_block] to have
    /// been called first.
    pub fn put_no_block(&self, keychain: &str, value: Node, create: bool) -> Result<(), KeymasterError> {
        let tx = self
            .put_tx
            .as_ref()
            .ok_or_else(|| KeymasterError::Transport("put thread not enabled".to_string()))?;
        tx.send(PutCommand {
            keychain: keychain.to_string(),
            value,
            create,
        })
        .map_err(|_| KeymasterError::Transport("put thread gone".to_string()))
    }

    /// Registers `callback` for every publication whose keychain is `key`
    /// or a descendant of it, and tells the SUB socket to filter on that
    /// prefix.
    pub fn subscribe(&self, key: &str, callback: SubscriptionCallback) -> Result<(), KeymasterError> {
        let tx = self.ensure_subscription_thread()?;
        tx.send(SubscriptionCommand::Subscribe(key.to_string(), callback))
            .map_err(|_| KeymasterError::Transport("subscription thread gone".to_string()))
    }

    pub fn unsubscribe(&self, key: &str) -> Result<(), KeymasterError> {
        let guard = self.subscription_tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            return Ok(());
        };
        tx.send(SubscriptionCommand::Unsubscribe(key.to_string()))
            .map_err(|_| KeymasterError::Transport("subscription thread gone".to_string()))
    }
}

impl Drop for KeymasterClient {
    fn drop(&mut self) {
        if let Some(tx) = self.subscription_tx.lock().unwrap().take() {
            let _ = tx.send(SubscriptionCommand::Shutdown);
        }
        if let Some(handle) = self.subscription_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        drop(self.put_tx.take());
        if let Some(handle) = self.put_handle.take() {
            let _ = handle.join();
        }
    }
}

fn wrap_zmq(e: zmq::Error) -> KeymasterError {
    KeymasterError::Transport(e.to_string())
}

fn endpoint(urn: &Urn) -> String {
    format!("{}://{}", urn.scheme.as_str(), urn.address)
}

fn subscription_loop(socket: zmq::Socket, rx: mpsc::Receiver<SubscriptionCommand>) {
    let mut callbacks: HashMap<String, SubscriptionCallback> = HashMap::new();

    loop {
        match rx.try_recv() {
            Ok(SubscriptionCommand::Subscribe(key, callback)) => {
                if socket.set_subscribe(key.as_bytes()).is_ok() {
                    callbacks.insert(key, callback);
                } else {
                    warn!("matrix-keymaster: failed to set subscribe filter");
                }
            }
            Ok(SubscriptionCommand::Unsubscribe(key)) => {
                let _ = socket.set_unsubscribe(key.as_bytes());
                callbacks.remove(&key);
            }
            Ok(SubscriptionCommand::Shutdown) => {
                debug!("matrix-keymaster: client subscription thread shutting down");
                return;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => return,
        }

        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        if zmq::poll(&mut items, 50).is_err() || !items[0].is_readable() {
            continue;
        }

        let Ok(Ok(key)) = socket.recv_string(0) else {
            continue;
        };
        let more = socket.get_rcvmore().unwrap_or(false);
        let payload = if more {
            socket.recv_string(0).ok().and_then(Result::ok).unwrap_or_default()
        } else {
            String::new()
        };

        let node = match wire::decode_heartbeat_or_node(&key, &payload) {
            Ok(node) => node,
            Err(e) => {
                warn!(error = %e, "matrix-keymaster: failed to decode publication");
                continue;
            }
        };

        // Dispatch to every subscription whose key is a prefix of (or
        // equal to) the published keychain, so a subscriber at any level
        // of the hierarchy sees the cascade.
        for (subscribed_key, callback) in callbacks.iter_mut() {
            if key == *subscribed_key || key.starts_with(&format!("{subscribed_key}.")) {
                callback(&key, &node);
            }
        }
    }
}

fn put_loop(socket: zmq::Socket, rx: mpsc::Receiver<PutCommand>) {
    for command in rx {
        let value_text = match serde_yaml::to_string(&command.value) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "matrix-keymaster: failed to encode put_no_block value");
                continue;
            }
        };
        let verb = Verb::Put {
            keychain: command.keychain,
            value: value_text,
            create: command.create,
        };
        for (i, frame) in verb.into_frames().into_iter().enumerate() {
            let more = if i < 3 { zmq::SNDMORE } else { 0 };
            if let Err(e) = socket.send(frame.as_str(), more) {
                warn!(error = %e, "matrix-keymaster: put_no_block send failed");
                break;
            }
        }
        if let Err(e) = socket.recv_string(0) {
            warn!(error = %e, "matrix-keymaster: put_no_block reply failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_formats_scheme_and_address() {
        let urn = Urn::parse("tcp://localhost:5555").unwrap();
        assert_eq!(endpoint(&urn), "tcp://localhost:5555");
    }
}
