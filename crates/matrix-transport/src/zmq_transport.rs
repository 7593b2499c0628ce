// SPDX-License-Identifier: Apache-2.0

//! `inproc`/`ipc`/`tcp` transports, all backed by ZeroMQ PUB/SUB sockets.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use crate::error::TransportError;
use crate::traits::{ClientTransport, ServerTransport, SubscriberCallback};
use crate::urn::{Scheme, Urn};

fn endpoint(urn: &Urn) -> String {
    format!("{}://{}", urn.scheme.as_str(), urn.address)
}

/// ZeroMQ PUB-socket-backed [`ServerTransport`]. Binding is not safe to
/// call concurrently with `publish`; the Matrix runtime only binds a
/// server transport once, at component construction.
pub struct ZmqServerTransport {
    context: zmq::Context,
    socket: Mutex<Option<zmq::Socket>>,
}

impl ZmqServerTransport {
    pub fn new(context: zmq::Context) -> Self {
        Self {
            context,
            socket: Mutex::new(None),
        }
    }
}

impl ServerTransport for ZmqServerTransport {
    fn bind(&self, urns: &[Urn]) -> Result<Vec<Urn>, TransportError> {
        let mut guard = self.socket.lock().unwrap();
        if let Some(existing) = guard.as_ref() {
            let last = existing
                .get_last_endpoint()
                .map_err(TransportError::Zmq)?
                .unwrap_or_default();
            return Ok(vec![Urn::parse(&last).unwrap_or_else(|_| urns[0].clone())]);
        }

        let socket = self.context.socket(zmq::PUB).map_err(TransportError::Zmq)?;
        let mut bound = Vec::with_capacity(urns.len());
        for urn in urns {
            let concrete = urn.complete();
            let ep = endpoint(&concrete);
            socket
                .bind(&ep)
                .map_err(|source| TransportError::BindFailed {
                    urn: ep.clone(),
                    source,
                })?;
            let resolved = if concrete.scheme == Scheme::Tcp {
                let last = socket
                    .get_last_endpoint()
                    .map_err(TransportError::Zmq)?
                    .unwrap_or(ep);
                Urn::parse(&last).unwrap_or(concrete)
            } else {
                concrete
            };
            bound.push(resolved);
        }
        *guard = Some(socket);
        Ok(bound)
    }

    fn publish(&self, key: &str, bytes: &[u8]) -> Result<(), TransportError> {
        let guard = self.socket.lock().unwrap();
        let socket = guard.as_ref().ok_or(TransportError::AlreadyReleased)?;
        socket
            .send(key, zmq::SNDMORE)
            .map_err(TransportError::Zmq)?;
        socket.send(bytes, 0).map_err(TransportError::Zmq)?;
        Ok(())
    }
}

enum Command {
    Connect(Urn, mpsc::Sender<Result<(), TransportError>>),
    Subscribe(String, SubscriberCallback),
    Unsubscribe(String),
    Disconnect,
}

/// ZeroMQ SUB-socket-backed [`ClientTransport`]. The socket is owned
/// exclusively by a background thread; `connect`/`subscribe`/`unsubscribe`
/// send commands to that thread rather than touching the socket directly,
/// since a ZeroMQ socket must only ever be used from one thread.
pub struct ZmqClientTransport {
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ZmqClientTransport {
    pub fn new(context: zmq::Context) -> Result<Self, TransportError> {
        let (tx, rx) = mpsc::channel::<Command>();
        let socket = context.socket(zmq::SUB).map_err(TransportError::Zmq)?;
        let handle = thread::Builder::new()
            .name("matrix-transport-sub".into())
            .spawn(move || run_subscriber_loop(socket, rx))
            .expect("spawn subscriber thread");

        Ok(Self {
            commands: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn send(&self, command: Command) -> Result<(), TransportError> {
        let guard = self.commands.lock().unwrap();
        let tx = guard.as_ref().ok_or(TransportError::AlreadyReleased)?;
        tx.send(command).map_err(|_| TransportError::AlreadyReleased)
    }
}

impl ClientTransport for ZmqClientTransport {
    fn connect(&self, urn: &Urn) -> Result<(), TransportError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(Command::Connect(urn.clone(), reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| TransportError::AlreadyReleased)?
    }

    fn subscribe(&self, key: &str, callback: SubscriberCallback) -> Result<(), TransportError> {
        self.send(Command::Subscribe(key.to_string(), callback))
    }

    fn unsubscribe(&self, key: &str) -> Result<(), TransportError> {
        self.send(Command::Unsubscribe(key.to_string()))
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.send(Command::Disconnect)?;
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        *self.commands.lock().unwrap() = None;
        Ok(())
    }
}

impl Drop for ZmqClientTransport {
    fn drop(&mut self) {
        let _ = self.send(Command::Disconnect);
        if let Some(handle) = self.handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

/// Poll loop owning the SUB socket: alternates between draining queued
/// commands and polling for inbound publications, on a short timeout so
/// neither side starves the other.
fn run_subscriber_loop(socket: zmq::Socket, rx: mpsc::Receiver<Command>) {
    let mut callbacks: HashMap<String, SubscriberCallback> = HashMap::new();

    loop {
        match rx.try_recv() {
            Ok(Command::Connect(urn, reply)) => {
                let result = socket
                    .connect(&endpoint(&urn))
                    .map_err(TransportError::Zmq);
                let _ = reply.send(result);
            }
            Ok(Command::Subscribe(key, callback)) => {
                if socket.set_subscribe(key.as_bytes()).is_ok() {
                    callbacks.insert(key, callback);
                }
            }
            Ok(Command::Unsubscribe(key)) => {
                let _ = socket.set_unsubscribe(key.as_bytes());
                callbacks.remove(&key);
            }
            Ok(Command::Disconnect) => {
                tracing::debug!("matrix-transport: subscriber thread shutting down");
                return;
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => return,
        }

        let mut items = [socket.as_poll_item(zmq::POLLIN)];
        let rc = zmq::poll(&mut items, 50);
        if rc.is_err() || !items[0].is_readable() {
            continue;
        }

        let Ok(key_frame) = socket.recv_bytes(0) else {
            continue;
        };
        let key = String::from_utf8_lossy(&key_frame).into_owned();
        let more = socket.get_rcvmore().unwrap_or(false);
        let payload = if more {
            socket.recv_bytes(0).unwrap_or_default()
        } else {
            Vec::new()
        };

        if let Some(callback) = callbacks.get_mut(&key) {
            callback(&key, &payload);
        }
    }
}
