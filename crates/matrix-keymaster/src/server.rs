// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use matrix_keystore::{delete, get, put, KmResult, Keychain, Node};
use matrix_transport::Urn;
use tracing::{debug, info, warn};

use crate::error::KeymasterError;
use crate::wire::{self, Verb, HEARTBEAT_KEY, PING_TOKEN};

const SNAPSHOT_QUEUE_CAPACITY: usize = 256;
const HEARTBEAT_PERIOD: Duration = Duration::from_millis(1000);

/// Hosts the hierarchical document: one control (REQ/REP) socket for
/// synchronous transactions, one publish (PUB) socket for change
/// notification and heartbeats. The state thread is the document's only
/// mutator; the publish thread only ever sees cloned snapshots handed to
/// it through a bounded channel, so it never locks the document.
pub struct KeymasterServer {
    context: zmq::Context,
    shutdown_endpoint: String,
    control_urns: Vec<Urn>,
    publish_urns: Vec<Urn>,
    state_handle: Option<JoinHandle<()>>,
    publish_handle: Option<JoinHandle<()>>,
}

impl KeymasterServer {
    /// Loads `config` as the initial document, binds the control and
    /// publish sockets named in `Keymaster.URLS`, and begins serving.
    pub fn start(mut config: Node) -> Result<Self, KeymasterError> {
        let context = zmq::Context::new();

        let requested_control = read_urn_list(&config, "Keymaster.URLS")?;
        let requested_publish = read_urn_list(&config, "KeymasterServer.PUBURLS")
            .unwrap_or_else(|_| vec![Urn::parse("inproc://XXXXX").expect("valid literal urn")]);

        let control_socket = context.socket(zmq::REP).map_err(wrap_zmq)?;
        let control_urns = bind_all(&control_socket, &requested_control)?;

        let publish_socket = context.socket(zmq::PUB).map_err(wrap_zmq)?;
        let publish_urns = bind_all(&publish_socket, &requested_publish)?;

        let shutdown_endpoint = format!("inproc://keymaster-shutdown-{:p}", &context);
        let shutdown_socket = context.socket(zmq::PAIR).map_err(wrap_zmq)?;
        shutdown_socket.bind(&shutdown_endpoint).map_err(wrap_zmq)?;

        store_bound_urns(&mut config, &control_urns, &publish_urns)?;

        let (snapshot_tx, snapshot_rx) = crossbeam_channel::bounded(SNAPSHOT_QUEUE_CAPACITY);

        let state_handle = thread::Builder::new()
            .name("matrix-keymaster-state".into())
            .spawn(move || state_loop(config, control_socket, shutdown_socket, snapshot_tx))
            .expect("spawn keymaster state thread");

        let publish_handle = thread::Builder::new()
            .name("matrix-keymaster-publish".into())
            .spawn(move || publish_loop(publish_socket, snapshot_rx))
            .expect("spawn keymaster publish thread");

        info!(?control_urns, ?publish_urns, "keymaster server listening");

        Ok(Self {
            context,
            shutdown_endpoint,
            control_urns,
            publish_urns,
            state_handle: Some(state_handle),
            publish_handle: Some(publish_handle),
        })
    }

    pub fn control_urns(&self) -> &[Urn] {
        &self.control_urns
    }

    pub fn publish_urns(&self) -> &[Urn] {
        &self.publish_urns
    }

    /// Sends the quit token down the control pipe, then joins both
    /// threads. Any blocking call against this server made by a client
    /// after this point will time out rather than succeed.
    pub fn terminate(&mut self) {
        if let Ok(socket) = self.context.socket(zmq::PAIR) {
            if socket.connect(&self.shutdown_endpoint).is_ok() {
                let _ = socket.send("quit", 0);
            }
        }
        if let Some(handle) = self.state_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.publish_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for KeymasterServer {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn wrap_zmq(e: zmq::Error) -> KeymasterError {
    KeymasterError::Transport(e.to_string())
}

fn read_urn_list(config: &Node, keychain: &str) -> Result<Vec<Urn>, KeymasterError> {
    let kc = Keychain::from_str(keychain).expect("literal keychain is valid");
    let result = get(config, &kc);
    if !result.ok {
        return Err(KeymasterError::Decode(format!(
            "config is missing required section '{keychain}'"
        )));
    }
    let entries = result
        .returned_node
        .as_sequence()
        .ok_or_else(|| KeymasterError::Decode(format!("'{keychain}' must be a sequence")))?;
    entries
        .iter()
        .map(|n| {
            let s = n
                .as_scalar()
                .ok_or_else(|| KeymasterError::Decode(format!("'{keychain}' entries must be scalars")))?;
            Urn::parse(s).map_err(KeymasterError::Construction)
        })
        .collect()
}

fn bind_all(socket: &zmq::Socket, requested: &[Urn]) -> Result<Vec<Urn>, KeymasterError> {
    let mut bound = Vec::with_capacity(requested.len());
    for urn in requested {
        let concrete = urn.complete();
        let endpoint = format!("{}://{}", concrete.scheme.as_str(), concrete.address);
        socket.bind(&endpoint).map_err(wrap_zmq)?;
        let resolved = if concrete.scheme == matrix_transport::Scheme::Tcp {
            let last = socket.get_last_endpoint().map_err(wrap_zmq)?.unwrap_or(endpoint);
            Urn::parse(&last).unwrap_or(concrete)
        } else {
            concrete
        };
        bound.push(resolved);
    }
    Ok(bound)
}

fn store_bound_urns(
    config: &mut Node,
    control: &[Urn],
    publish: &[Urn],
) -> Result<(), KeymasterError> {
    let control_seq = Node::Sequence(control.iter().map(|u| Node::scalar(u.to_string())).collect());
    let publish_seq = Node::Sequence(publish.iter().map(|u| Node::scalar(u.to_string())).collect());

    let urls_key = Keychain::from_str("Keymaster.URLS").expect("literal");
    let pub_key = Keychain::from_str("KeymasterServer.PUBURLS").expect("literal");
    put(config, &urls_key, control_seq, true);
    put(config, &pub_key, publish_seq, true);
    Ok(())
}

/// Applies one verb to `document`, returning the result and, on a
/// successful mutation, the ancestor snapshots to publish (shortest
/// ancestor first, `keychain` itself last).
fn apply_verb(document: &mut Node, verb: Verb) -> (KmResult, Vec<(Keychain, Node)>) {
    match verb {
        Verb::Ping => (
            KmResult {
                ok: true,
                last_good_key: Keychain::root(),
                error_message: String::new(),
                returned_node: Node::scalar(PING_TOKEN),
            },
            Vec::new(),
        ),
        Verb::Get { keychain } => {
            let kc = match Keychain::parse(&keychain) {
                Ok(kc) => kc,
                Err(e) => return (malformed_keychain(e), Vec::new()),
            };
            (get(document, &kc), Vec::new())
        }
        Verb::Put {
            keychain,
            value,
            create,
        } => {
            let kc = match Keychain::parse(&keychain) {
                Ok(kc) => kc,
                Err(e) => return (malformed_keychain(e), Vec::new()),
            };
            let new_value = match serde_yaml::from_str::<Node>(&value) {
                Ok(v) => v,
                Err(e) => {
                    return (
                        KmResult {
                            ok: false,
                            last_good_key: Keychain::root(),
                            error_message: format!("malformed value: {e}"),
                            returned_node: Node::Undefined,
                        },
                        Vec::new(),
                    )
                }
            };
            let result = put(document, &kc, new_value, create);
            let events = if result.ok {
                snapshot_ancestors(document, &kc)
            } else {
                Vec::new()
            };
            (result, events)
        }
        Verb::Del { keychain } => {
            let kc = match Keychain::parse(&keychain) {
                Ok(kc) => kc,
                Err(e) => return (malformed_keychain(e), Vec::new()),
            };
            let parent = kc.prefix(kc.len().saturating_sub(1));
            let result = delete(document, &kc);
            let events = if result.ok {
                snapshot_ancestors(document, &parent)
            } else {
                Vec::new()
            };
            (result, events)
        }
    }
}

fn malformed_keychain(e: matrix_keystore::KeychainError) -> KmResult {
    KmResult {
        ok: false,
        last_good_key: Keychain::root(),
        error_message: e.to_string(),
        returned_node: Node::Undefined,
    }
}

fn snapshot_ancestors(document: &Node, keychain: &Keychain) -> Vec<(Keychain, Node)> {
    keychain
        .ancestors_inclusive()
        .into_iter()
        .map(|ancestor| {
            let node = get(document, &ancestor).returned_node;
            (ancestor, node)
        })
        .collect()
}

fn state_loop(
    mut document: Node,
    control_socket: zmq::Socket,
    shutdown_socket: zmq::Socket,
    snapshot_tx: crossbeam_channel::Sender<(String, Node)>,
) {
    loop {
        let mut items = [
            control_socket.as_poll_item(zmq::POLLIN),
            shutdown_socket.as_poll_item(zmq::POLLIN),
        ];
        if zmq::poll(&mut items, -1).is_err() {
            warn!("matrix-keymaster: poll error in state thread, shutting down");
            return;
        }
        if items[1].is_readable() {
            let _ = shutdown_socket.recv_string(0);
            debug!("matrix-keymaster: state thread received quit token");
            return;
        }
        if !items[0].is_readable() {
            continue;
        }

        let frames = match control_socket.recv_multipart(0) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "matrix-keymaster: failed to receive control request");
                continue;
            }
        };
        let frames: Vec<String> = frames
            .into_iter()
            .map(|f| String::from_utf8_lossy(&f).into_owned())
            .collect();

        let verb = match Verb::from_frames(&frames) {
            Ok(verb) => verb,
            Err(message) => {
                let result = KmResult {
                    ok: false,
                    last_good_key: Keychain::root(),
                    error_message: message,
                    returned_node: Node::Undefined,
                };
                reply(&control_socket, &result);
                continue;
            }
        };

        let (result, events) = apply_verb(&mut document, verb);
        reply(&control_socket, &result);

        for (keychain, node) in events {
            if snapshot_tx.send((keychain.to_string(), node)).is_err() {
                warn!("matrix-keymaster: publish thread gone, dropping snapshot");
            }
        }
    }
}

fn reply(socket: &zmq::Socket, result: &KmResult) {
    match wire::encode_result(result) {
        Ok(text) => {
            if let Err(e) = socket.send(&text, 0) {
                warn!(error = %e, "matrix-keymaster: failed to send reply");
            }
        }
        Err(e) => warn!(error = %e, "matrix-keymaster: failed to encode reply"),
    }
}

fn publish_loop(socket: zmq::Socket, snapshot_rx: crossbeam_channel::Receiver<(String, Node)>) {
    loop {
        match snapshot_rx.recv_timeout(HEARTBEAT_PERIOD) {
            Ok((keychain, node)) => {
                let payload = match serde_yaml::to_string(&node) {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "matrix-keymaster: failed to serialize publication");
                        continue;
                    }
                };
                send_publication(&socket, &keychain, &payload);
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                send_publication(&socket, HEARTBEAT_KEY, &Utc::now().to_rfc3339());
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                debug!("matrix-keymaster: publish thread shutting down");
                return;
            }
        }
    }
}

fn send_publication(socket: &zmq::Socket, key: &str, payload: &str) {
    if let Err(e) = socket.send(key, zmq::SNDMORE) {
        warn!(error = %e, "matrix-keymaster: failed to send publish key frame");
        return;
    }
    if let Err(e) = socket.send(payload, 0) {
        warn!(error = %e, "matrix-keymaster: failed to send publish payload frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_urls() -> Node {
        let mut config = Node::mapping();
        let urls = Keychain::from_str("Keymaster.URLS").unwrap();
        put(
            &mut config,
            &urls,
            Node::Sequence(vec![Node::scalar("inproc://XXXXX")]),
            true,
        );
        config
    }

    #[test]
    fn apply_verb_ping_reports_ok() {
        let mut document = Node::mapping();
        let (result, events) = apply_verb(&mut document, Verb::Ping);
        assert!(result.ok);
        assert!(events.is_empty());
    }

    #[test]
    fn apply_verb_put_emits_one_event_per_ancestor() {
        let mut document = Node::mapping();
        let (result, events) = apply_verb(
            &mut document,
            Verb::Put {
                keychain: "a.b.c".to_string(),
                value: "42".to_string(),
                create: true,
            },
        );
        assert!(result.ok);
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].0.to_string(), "a.b.c");
    }

    #[test]
    fn apply_verb_get_on_missing_path_fails_without_events() {
        let mut document = Node::mapping();
        let (result, events) = apply_verb(
            &mut document,
            Verb::Get {
                keychain: "missing".to_string(),
            },
        );
        assert!(!result.ok);
        assert!(events.is_empty());
    }

    #[test]
    fn start_binds_configured_urn_and_stores_it_back() {
        let server = KeymasterServer::start(config_with_urls()).unwrap();
        assert_eq!(server.control_urns().len(), 1);
    }
}
