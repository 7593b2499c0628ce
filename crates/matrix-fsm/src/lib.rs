// SPDX-License-Identifier: Apache-2.0

//! A reusable, data-driven finite state machine.
//!
//! States and events are caller-defined tokens (`S`/`E`: `Eq + Hash + Clone
//! + Debug`). Transitions are registered with [`TransitionBuilder`] and
//! carry an optional predicate list (combined by [`Reduction::And`] or
//! [`Reduction::Or`]) plus an optional action. Predicates and actions are
//! boxed closures rather than a base-class hierarchy — see
//! [`Predicate`]/[`Action`].
//!
//! ```
//! use matrix_fsm::{Reduction, StateMachine, TransitionBuilder};
//!
//! let mut fsm = StateMachine::new("Off");
//! fsm.add_state("On");
//! fsm.add_transition(TransitionBuilder::new("Off", "mpress", "On"));
//! fsm.add_transition(TransitionBuilder::new("On", "hold", "Off"));
//! fsm.add_transition(TransitionBuilder::new("On", "mpress", "On"));
//!
//! assert!(fsm.handle_event(&"mpress"));
//! assert_eq!(fsm.current_state(), &"On");
//! assert!(fsm.handle_event(&"mpress"));
//! assert!(fsm.handle_event(&"hold"));
//! assert_eq!(fsm.current_state(), &"Off");
//! assert!(!fsm.handle_event(&"boom"));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// A caller-supplied condition evaluated when deciding whether a transition
/// fires. Evaluated left-to-right and combined per [`Reduction`].
pub type Predicate = Box<dyn FnMut() -> bool + Send>;

/// A caller-supplied side effect run as part of a transition or as a
/// state's entry/exit action.
pub type Action = Box<dyn FnMut() + Send>;

/// How a transition's predicate list combines into a single outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// All predicates must be true (the default). An empty list is
    /// vacuously true.
    And,
    /// At least one predicate must be true. An empty list is vacuously
    /// true as well, matching `And`'s empty-list behavior.
    Or,
}

struct Transition<S> {
    to: S,
    predicates: Vec<Predicate>,
    reduction: Reduction,
    action: Option<Action>,
}

impl<S> Transition<S> {
    fn evaluate(&mut self) -> bool {
        if self.predicates.is_empty() {
            return true;
        }
        match self.reduction {
            Reduction::And => self.predicates.iter_mut().all(|p| p()),
            Reduction::Or => self.predicates.iter_mut().any(|p| p()),
        }
    }

    fn has_predicates(&self) -> bool {
        !self.predicates.is_empty()
    }
}

/// Builder for a single transition, passed to [`StateMachine::add_transition`].
pub struct TransitionBuilder<S, E> {
    from: S,
    event: E,
    to: S,
    predicates: Vec<Predicate>,
    reduction: Reduction,
    action: Option<Action>,
}

impl<S, E> TransitionBuilder<S, E> {
    /// Starts a transition from `from` to `to` on `event`, with no
    /// predicates (always fires) and no action.
    pub fn new(from: S, event: E, to: S) -> Self {
        Self {
            from,
            event,
            to,
            predicates: Vec::new(),
            reduction: Reduction::And,
            action: None,
        }
    }

    /// Appends a predicate to the transition's predicate list.
    pub fn with_predicate(mut self, predicate: impl FnMut() -> bool + Send + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Sets how the predicate list combines (default [`Reduction::And`]).
    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Sets the transition action, run after the exit action of the
    /// current state and before the entry action of the target state.
    pub fn with_action(mut self, action: impl FnMut() + Send + 'static) -> Self {
        self.action = Some(Box::new(action));
        self
    }
}

/// A data-driven finite state machine over caller-defined states `S` and
/// events `E`.
///
/// Not thread-safe: the C++ original relies on the enclosing component to
/// serialize calls through a single command-handling thread, and this port
/// keeps that division of responsibility rather than adding internal
/// locking the spec never asked for.
pub struct StateMachine<S, E> {
    states: HashSet<S>,
    initial: S,
    current: S,
    transitions: HashMap<(S, E), Vec<Transition<S>>>,
    entry_actions: HashMap<S, Vec<Action>>,
    exit_actions: HashMap<S, Vec<Action>>,
    sequence_event: Option<E>,
    last_consistency_error: Option<String>,
}

impl<S, E> StateMachine<S, E>
where
    S: Eq + Hash + Clone + Debug,
    E: Eq + Hash + Clone + Debug,
{
    /// Creates a machine whose initial (and current) state is `initial`.
    pub fn new(initial: S) -> Self {
        let mut states = HashSet::new();
        states.insert(initial.clone());
        Self {
            states,
            initial: initial.clone(),
            current: initial,
            transitions: HashMap::new(),
            entry_actions: HashMap::new(),
            exit_actions: HashMap::new(),
            sequence_event: None,
            last_consistency_error: None,
        }
    }

    /// Declares a state. Idempotent.
    pub fn add_state(&mut self, state: S) {
        self.states.insert(state);
    }

    /// Re-declares the initial state and resets the current state to it.
    /// Intended to be called during setup, before `handle_event`.
    pub fn set_initial(&mut self, state: S) {
        self.states.insert(state.clone());
        self.initial = state.clone();
        self.current = state;
    }

    /// Registers the distinguished event that [`sequence`][Self::sequence]
    /// applies.
    pub fn set_sequence_event(&mut self, event: E) {
        self.sequence_event = Some(event);
    }

    /// Registers a transition built with [`TransitionBuilder`].
    pub fn add_transition(&mut self, builder: TransitionBuilder<S, E>) {
        self.states.insert(builder.from.clone());
        self.states.insert(builder.to.clone());
        let key = (builder.from, builder.event);
        self.transitions
            .entry(key)
            .or_default()
            .push(Transition {
                to: builder.to_state(),
                predicates: builder.predicates,
                reduction: builder.reduction,
                action: builder.action,
            });
    }

    /// Adds an action run whenever the machine enters `state` (including
    /// self-transitions).
    pub fn add_entry_action(&mut self, state: S, action: impl FnMut() + Send + 'static) {
        self.states.insert(state.clone());
        self.entry_actions
            .entry(state)
            .or_default()
            .push(Box::new(action));
    }

    /// Adds an action run whenever the machine leaves `state` (including
    /// self-transitions).
    pub fn add_exit_action(&mut self, state: S, action: impl FnMut() + Send + 'static) {
        self.states.insert(state.clone());
        self.exit_actions
            .entry(state)
            .or_default()
            .push(Box::new(action));
    }

    /// Returns the current state.
    pub fn current_state(&self) -> &S {
        &self.current
    }

    /// Looks up the transitions registered for `(current, event)`, runs
    /// their predicates left-to-right, and fires the first whose combined
    /// predicate is true: exit action of the current state, then the
    /// transition's own action, then the entry action of the target state,
    /// then the state is updated.
    ///
    /// Returns `true` iff exactly one transition fired. Events with no
    /// registered transition from the current state are rejected (`false`)
    /// without any state change.
    pub fn handle_event(&mut self, event: &E) -> bool {
        let key = (self.current.clone(), event.clone());
        let Some(candidates) = self.transitions.get_mut(&key) else {
            tracing::debug!(
                "StateMachine: no transition for state {:?} on event {:?}",
                self.current,
                event
            );
            return false;
        };

        let fired_index = candidates.iter_mut().position(|t| t.evaluate());
        let Some(index) = fired_index else {
            tracing::debug!(
                "StateMachine: no predicate satisfied for state {:?} on event {:?}",
                self.current,
                event
            );
            return false;
        };

        // Take the target/action out before running actions so a panic
        // inside a user callback can't leave the transition half-applied
        // in a way that's invisible to the caller. The state itself is
        // still only updated after the exit + transition actions run; if
        // the entry action panics the state has already advanced, as
        // documented.
        let to = candidates[index].to.clone();
        if let Some(exit_actions) = self.exit_actions.get_mut(&self.current) {
            for action in exit_actions.iter_mut() {
                action();
            }
        }
        if let Some(action) = candidates[index].action.as_mut() {
            action();
        }
        self.current = to;
        if let Some(entry_actions) = self.entry_actions.get_mut(&self.current) {
            for action in entry_actions.iter_mut() {
                action();
            }
        }
        true
    }

    /// Applies the distinguished sequence event, for FSMs driven by a
    /// periodic tick. Returns `false` (and logs) if no sequence event was
    /// registered via [`set_sequence_event`][Self::set_sequence_event].
    pub fn sequence(&mut self) -> bool {
        let Some(event) = self.sequence_event.clone() else {
            tracing::warn!("StateMachine: sequence() called with no sequence event registered");
            return false;
        };
        self.handle_event(&event)
    }

    /// Returns the diagnostic from the last failed [`consistency_check`][Self::consistency_check].
    pub fn last_consistency_error(&self) -> Option<&str> {
        self.last_consistency_error.as_deref()
    }

    /// Verifies every declared state is reachable from the initial state,
    /// and rejects ambiguous transition sets: more than one
    /// unconditionally-true transition registered for the same
    /// `(state, event)` pair, since "first true predicate wins" between
    /// two vacuously-true candidates is not a meaningful tie-break. Stores
    /// a diagnostic (retrievable via
    /// [`last_consistency_error`][Self::last_consistency_error]) and
    /// returns `false` on either failure.
    pub fn consistency_check(&mut self) -> bool {
        self.last_consistency_error = None;

        for ((state, event), candidates) in &self.transitions {
            let unconditional = candidates.iter().filter(|t| !t.has_predicates()).count();
            if unconditional > 1 {
                let msg = format!(
                    "ambiguous transitions: state {state:?} on event {event:?} has {unconditional} unconditionally-true transitions"
                );
                tracing::warn!("StateMachine: {msg}");
                self.last_consistency_error = Some(msg);
                return false;
            }
        }

        let mut reached: HashSet<S> = HashSet::new();
        let mut stack = vec![self.initial.clone()];
        reached.insert(self.initial.clone());
        while let Some(state) = stack.pop() {
            for (from, event) in self.transitions.keys() {
                if *from != state {
                    continue;
                }
                for t in &self.transitions[&(from.clone(), event.clone())] {
                    if reached.insert(t.to.clone()) {
                        stack.push(t.to.clone());
                    }
                }
            }
        }

        let unreachable: Vec<&S> = self.states.difference(&reached).collect();
        if !unreachable.is_empty() {
            let msg = format!("unreachable states from initial: {unreachable:?}");
            tracing::warn!("StateMachine: {msg}");
            self.last_consistency_error = Some(msg);
            return false;
        }

        for state in &reached {
            let has_outgoing = self.transitions.keys().any(|(from, _)| from == state);
            if !has_outgoing {
                let msg = format!("state {state:?} is reachable but has no outgoing transition");
                tracing::warn!("StateMachine: {msg}");
                self.last_consistency_error = Some(msg);
                return false;
            }
        }

        true
    }
}

impl<S, E> TransitionBuilder<S, E>
where
    S: Clone,
{
    fn to_state(&self) -> S {
        self.to.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_transitions_run_entry_and_exit_actions() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let entries = Arc::new(AtomicUsize::new(0));
        let exits = Arc::new(AtomicUsize::new(0));

        let mut fsm = StateMachine::new("On");
        {
            let entries = entries.clone();
            fsm.add_entry_action("On", move || {
                entries.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let exits = exits.clone();
            fsm.add_exit_action("On", move || {
                exits.fetch_add(1, Ordering::SeqCst);
            });
        }
        fsm.add_transition(TransitionBuilder::new("On", "mpress", "On"));

        assert!(fsm.handle_event(&"mpress"));
        assert_eq!(entries.load(Ordering::SeqCst), 1);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn predicate_list_first_true_wins() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(
            TransitionBuilder::new("Idle", "go", "Blocked").with_predicate(|| false),
        );
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Running").with_predicate(|| true));

        assert!(fsm.handle_event(&"go"));
        assert_eq!(fsm.current_state(), &"Running");
    }

    #[test]
    fn or_reduction_fires_when_any_predicate_true() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(
            TransitionBuilder::new("Idle", "go", "Running")
                .with_predicate(|| false)
                .with_predicate(|| true)
                .with_reduction(Reduction::Or),
        );

        assert!(fsm.handle_event(&"go"));
        assert_eq!(fsm.current_state(), &"Running");
    }

    #[test]
    fn unregistered_event_is_rejected_without_state_change() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Running"));

        assert!(!fsm.handle_event(&"boom"));
        assert_eq!(fsm.current_state(), &"Idle");
    }

    #[test]
    fn sequence_applies_distinguished_event() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(TransitionBuilder::new("Idle", "tick", "Running"));
        fsm.set_sequence_event("tick");

        assert!(fsm.sequence());
        assert_eq!(fsm.current_state(), &"Running");
    }

    #[test]
    fn consistency_check_detects_unreachable_state() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_state("Orphan");
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Running"));

        assert!(!fsm.consistency_check());
        assert!(fsm.last_consistency_error().unwrap().contains("Orphan"));
    }

    #[test]
    fn consistency_check_detects_ambiguous_unconditional_transitions() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Running"));
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Blocked"));

        assert!(!fsm.consistency_check());
        assert!(fsm
            .last_consistency_error()
            .unwrap()
            .contains("ambiguous"));
    }

    #[test]
    fn consistency_check_passes_for_fully_reachable_machine() {
        let mut fsm = StateMachine::new("Off");
        fsm.add_transition(TransitionBuilder::new("Off", "mpress", "On"));
        fsm.add_transition(TransitionBuilder::new("On", "hold", "Off"));
        fsm.add_transition(TransitionBuilder::new("On", "mpress", "On"));

        assert!(fsm.consistency_check());
    }

    #[test]
    fn consistency_check_detects_reachable_state_with_no_outgoing_transition() {
        let mut fsm = StateMachine::new("Idle");
        fsm.add_transition(TransitionBuilder::new("Idle", "go", "Done"));

        assert!(!fsm.consistency_check());
        assert!(fsm.last_consistency_error().unwrap().contains("Done"));
    }

    #[test]
    fn scenario_d_button_fsm_end_to_end() {
        let mut fsm = StateMachine::new("Off");
        fsm.add_transition(TransitionBuilder::new("Off", "mpress", "On"));
        fsm.add_transition(TransitionBuilder::new("On", "hold", "Off"));
        fsm.add_transition(TransitionBuilder::new("On", "mpress", "On"));

        assert!(fsm.handle_event(&"mpress"));
        assert_eq!(fsm.current_state(), &"On");
        assert!(fsm.handle_event(&"mpress"));
        assert_eq!(fsm.current_state(), &"On");
        assert!(fsm.handle_event(&"hold"));
        assert_eq!(fsm.current_state(), &"Off");
        assert!(!fsm.handle_event(&"boom"));
        assert_eq!(fsm.current_state(), &"Off");
    }
}
