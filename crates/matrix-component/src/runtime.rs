// SPDX-License-Identifier: Apache-2.0

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use matrix_data::{DataSink, Decode, TransportSelector};
use matrix_keymaster::KeymasterClient;
use matrix_keystore::Node;
use matrix_transport::{Scheme, Urn};
use matrix_fsm::{StateMachine, TransitionBuilder};
use tracing::{debug, warn};

use crate::error::ComponentError;
use crate::lifecycle::{LifecycleCommand, LifecycleState};

/// Hooks a concrete component overrides to react to lifecycle transitions
/// (spec.md §4.9). Each defaults to `true` (no-op success) so a component
/// only needs to override the stages it cares about. Returning `false`
/// aborts the transition: the FSM does not advance and the unchanged state
/// is republished for the architect to observe.
pub trait Component: Send {
    fn name(&self) -> &str;

    /// Standby → Ready: open files/sockets, allocate buffers.
    fn do_ready(&mut self) -> bool {
        true
    }

    /// Ready → Running: launch worker thread(s).
    fn do_start(&mut self) -> bool {
        true
    }

    /// Running → Ready: join worker thread(s).
    fn do_stop(&mut self) -> bool {
        true
    }

    /// Ready → Standby: release resources.
    fn do_standby(&mut self) -> bool {
        true
    }
}

/// Ties the FSM, the Keymaster client, and a [`Component`]'s hooks
/// together: subscribes to `components.<name>.command`, drives the fixed
/// Created→Standby→Ready→Running machine, and republishes
/// `components.<name>.state` after every command (changed or not, so the
/// architect's subscription sees the attempt either way).
///
/// The hook-as-predicate wiring (see `new`) is what gives "hook returns
/// false ⇒ transition aborted, state unchanged" for free from
/// [`StateMachine::handle_event`]'s existing predicate semantics, rather
/// than needing a second abort path bolted onto the FSM.
pub struct ComponentRuntime {
    name: String,
    km_url: Urn,
    mode: String,
    client: Arc<KeymasterClient>,
    fsm: Arc<Mutex<StateMachine<LifecycleState, LifecycleCommand>>>,
}

impl ComponentRuntime {
    /// Connects a dedicated Keymaster client, wires the standard lifecycle
    /// FSM around `component`'s hooks, announces `Created` state, and
    /// subscribes to `components.<name>.command`. `mode` is the
    /// operational mode key used to resolve `connections.<mode>` in
    /// [`connect_sink`][Self::connect_sink] (`"default"` if the caller has
    /// no other mode).
    pub fn start(
        name: impl Into<String>,
        km_url: Urn,
        mode: impl Into<String>,
        component: Arc<Mutex<dyn Component>>,
    ) -> Result<Self, ComponentError> {
        let name = name.into();
        let mode = mode.into();
        let client = Arc::new(KeymasterClient::connect(&km_url, false)?);

        let mut fsm = StateMachine::new(LifecycleState::Created);
        fsm.add_state(LifecycleState::Standby);
        fsm.add_state(LifecycleState::Ready);
        fsm.add_state(LifecycleState::Running);

        fsm.add_transition(TransitionBuilder::new(
            LifecycleState::Created,
            LifecycleCommand::DoRegister,
            LifecycleState::Standby,
        ));

        {
            let component = component.clone();
            fsm.add_transition(
                TransitionBuilder::new(
                    LifecycleState::Standby,
                    LifecycleCommand::DoInit,
                    LifecycleState::Ready,
                )
                .with_predicate(move || component.lock().unwrap().do_ready()),
            );
        }
        {
            let component = component.clone();
            fsm.add_transition(
                TransitionBuilder::new(
                    LifecycleState::Ready,
                    LifecycleCommand::DoStart,
                    LifecycleState::Running,
                )
                .with_predicate(move || component.lock().unwrap().do_start()),
            );
        }
        {
            let component = component.clone();
            fsm.add_transition(
                TransitionBuilder::new(
                    LifecycleState::Running,
                    LifecycleCommand::DoStop,
                    LifecycleState::Ready,
                )
                .with_predicate(move || component.lock().unwrap().do_stop()),
            );
        }
        {
            let component = component.clone();
            fsm.add_transition(
                TransitionBuilder::new(
                    LifecycleState::Ready,
                    LifecycleCommand::DoStandby,
                    LifecycleState::Standby,
                )
                .with_predicate(move || component.lock().unwrap().do_standby()),
            );
        }
        {
            let component = component.clone();
            let client = client.clone();
            let name_for_error = name.clone();
            fsm.add_transition(
                TransitionBuilder::new(
                    LifecycleState::Running,
                    LifecycleCommand::Error,
                    LifecycleState::Ready,
                )
                .with_predicate(move || component.lock().unwrap().do_stop())
                .with_action(move || {
                    let _ = client.put(
                        &format!("components.{name_for_error}.last_error"),
                        Node::scalar("component reported an error while running"),
                        true,
                    );
                }),
            );
        }

        let fsm = Arc::new(Mutex::new(fsm));

        let state_key = format!("components.{name}.state");
        client.put(&state_key, Node::scalar(LifecycleState::Created.to_string()), true)?;

        let command_key = format!("components.{name}.command");
        let sub_fsm = fsm.clone();
        let sub_client = client.clone();
        let sub_name = name.clone();
        client.subscribe(
            &command_key,
            Box::new(move |_key, node| {
                let Some(raw) = node.as_scalar() else {
                    warn!(component = %sub_name, "command publication was not a scalar");
                    return;
                };
                let Ok(command) = LifecycleCommand::from_str(raw) else {
                    warn!(component = %sub_name, command = %raw, "unknown lifecycle command");
                    return;
                };

                let (fired, state) = {
                    let mut guard = sub_fsm.lock().unwrap();
                    let fired = guard.handle_event(&command);
                    (fired, *guard.current_state())
                };

                if !fired {
                    warn!(component = %sub_name, command = %raw, state = %state, "lifecycle command rejected");
                } else {
                    debug!(component = %sub_name, command = %raw, state = %state, "lifecycle transition applied");
                }

                let state_key = format!("components.{sub_name}.state");
                if let Err(e) = sub_client.put(&state_key, Node::scalar(state.to_string()), true) {
                    warn!(component = %sub_name, error = %e, "failed to publish lifecycle state");
                }
            }),
        )?;

        Ok(Self {
            name,
            km_url,
            mode,
            client,
            fsm,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn km_url(&self) -> &Urn {
        &self.km_url
    }

    pub fn client(&self) -> &Arc<KeymasterClient> {
        &self.client
    }

    pub fn current_state(&self) -> LifecycleState {
        *self.fsm.lock().unwrap().current_state()
    }

    /// Looks up `connections.<mode>` for the row whose consumer is this
    /// component and whose sink name is `local_name`
    /// (`[producer, source-name, consumer, sink-name, transport-scheme]`,
    /// spec.md §6), then connects `sink` to that producer's source over
    /// the named transport scheme.
    pub fn connect_sink<T, Sel>(
        &self,
        sink: &DataSink<T, Sel>,
        local_name: &str,
    ) -> Result<(), ComponentError>
    where
        T: Decode + Send + 'static,
        Sel: TransportSelector,
    {
        let (producer, source_name, scheme) = self.find_connection(local_name)?;
        sink.connect(&self.km_url, &producer, &source_name, Some(scheme))?;
        Ok(())
    }

    fn find_connection(&self, local_name: &str) -> Result<(String, String, Scheme), ComponentError> {
        let key = format!("connections.{}", self.mode);
        let node = self.client.get(&key)?;
        let rows = node.as_sequence().ok_or_else(|| ComponentError::MalformedConnection {
            mode: self.mode.clone(),
            detail: "not a sequence".to_string(),
        })?;

        for row in rows {
            let items = row.as_sequence().ok_or_else(|| ComponentError::MalformedConnection {
                mode: self.mode.clone(),
                detail: "row is not a sequence".to_string(),
            })?;
            if items.len() != 5 {
                return Err(ComponentError::MalformedConnection {
                    mode: self.mode.clone(),
                    detail: format!("row has {} fields, expected 5", items.len()),
                });
            }
            let scalars: Vec<&str> = items.iter().filter_map(Node::as_scalar).collect();
            if scalars.len() != 5 {
                return Err(ComponentError::MalformedConnection {
                    mode: self.mode.clone(),
                    detail: "row contains a non-scalar field".to_string(),
                });
            }
            let (producer, source_name, consumer, sink_name, scheme_str) = match scalars[..] {
                [p, s, c, sk, sc] => (p, s, c, sk, sc),
                _ => unreachable!("checked len == 5 above"),
            };
            if consumer == self.name && sink_name == local_name {
                let scheme = Scheme::parse(scheme_str)?;
                return Ok((producer.to_string(), source_name.to_string(), scheme));
            }
        }

        Err(ComponentError::NoConnection {
            mode: self.mode.clone(),
            consumer: self.name.clone(),
            sink_name: local_name.to_string(),
        })
    }
}

impl Drop for ComponentRuntime {
    fn drop(&mut self) {
        let _ = self.client.unsubscribe(&format!("components.{}.command", self.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        ready_calls: usize,
        fail_start: bool,
    }

    impl Component for Counting {
        fn name(&self) -> &str {
            "counting"
        }
        fn do_ready(&mut self) -> bool {
            self.ready_calls += 1;
            true
        }
        fn do_start(&mut self) -> bool {
            !self.fail_start
        }
    }

    #[test]
    fn lifecycle_state_round_trips_through_display_and_parse() {
        assert_eq!(LifecycleState::Created.to_string(), "Created");
        assert_eq!(
            LifecycleCommand::from_str("do_init").unwrap(),
            LifecycleCommand::DoInit
        );
        assert!(LifecycleCommand::from_str("do_explode").is_err());
    }
}
