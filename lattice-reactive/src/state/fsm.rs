//! Table-driven finite state machine.
//!
//! Unlike [`Machine`](super::Machine), an [`Fsm`] only moves along rows of an
//! explicit transition table. An action with no matching row for the current
//! state, or whose guard refuses, is ignored: the state stays put and no
//! subscriber hears anything.

use std::fmt::Debug;
use std::sync::Arc;

use crate::reactive::{Container, Subscription, Value};

type Guard = Arc<dyn Fn() -> bool + Send + Sync>;

/// One row of the table: in state `from`, action `on` moves to `to`.
pub struct Transition<S, A> {
    pub from: S,
    pub on: A,
    pub to: S,
    guard: Option<Guard>,
}

impl<S: PartialEq, A: PartialEq> Transition<S, A> {
    /// An unguarded row.
    pub fn new(from: S, on: A, to: S) -> Self {
        Self {
            from,
            on,
            to,
            guard: None,
        }
    }

    /// Only allow this row while `guard` returns true.
    pub fn guard<G>(mut self, guard: G) -> Self
    where
        G: Fn() -> bool + Send + Sync + 'static,
    {
        self.guard = Some(Arc::new(guard));
        self
    }

    fn allows(&self, state: &S, action: &A) -> bool {
        self.from == *state && self.on == *action && self.guard.as_ref().map_or(true, |g| g())
    }
}

impl<S: Debug, A: Debug> Debug for Transition<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("from", &self.from)
            .field("on", &self.on)
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}

/// A state container driven by a fixed transition table.
pub struct Fsm<S: Value, A> {
    state: Container<S>,
    transitions: Arc<Vec<Transition<S, A>>>,
}

impl<S: Value, A: PartialEq> Fsm<S, A> {
    /// Create a machine in state `initial`. Rows are matched in order.
    pub fn new(initial: S, transitions: Vec<Transition<S, A>>) -> Self {
        Self {
            state: Container::new(initial),
            transitions: Arc::new(transitions),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> S {
        self.state.value()
    }

    fn find(&self, action: &A) -> Option<&Transition<S, A>> {
        let current = self.state.value();
        self.transitions
            .iter()
            .find(|row| row.allows(&current, action))
    }

    /// Whether `action` would be accepted right now.
    pub fn can(&self, action: &A) -> bool {
        self.find(action).is_some()
    }

    /// Apply `action` if a row allows it. Returns whether a row matched.
    pub fn send(&self, action: A) -> bool {
        match self.find(&action).map(|row| row.to.clone()) {
            Some(next) => {
                self.state.set(next);
                true
            }
            None => {
                tracing::debug!(fsm = self.state.id(), "no transition for action");
                false
            }
        }
    }

    /// Actions with a row leaving the current state whose guard passes.
    pub fn available_actions(&self) -> Vec<A>
    where
        A: Clone,
    {
        let current = self.state.value();
        self.transitions
            .iter()
            .filter(|row| row.allows(&current, &row.on))
            .map(|row| row.on.clone())
            .collect()
    }

    /// Register a callback invoked with every new state.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.state.subscribe(callback)
    }

    /// Borrow the state container.
    pub fn as_container(&self) -> &Container<S> {
        &self.state
    }

    /// Drop all subscribers and ignore further actions.
    pub fn dispose(&self) {
        self.state.dispose();
    }
}

impl<S: Value, A> Clone for Fsm<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            transitions: Arc::clone(&self.transitions),
        }
    }
}

/// Shorthand for [`Fsm::new`].
pub fn fsm<S: Value, A: PartialEq>(initial: S, transitions: Vec<Transition<S, A>>) -> Fsm<S, A> {
    Fsm::new(initial, transitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn loader() -> Fsm<&'static str, &'static str> {
        fsm(
            "idle",
            vec![
                Transition::new("idle", "start", "loading"),
                Transition::new("loading", "done", "ready"),
                Transition::new("loading", "fail", "idle"),
            ],
        )
    }

    #[test]
    fn unknown_action_is_a_silent_no_op() {
        let machine = fsm("idle", vec![Transition::new("idle", "start", "loading")]);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = machine.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!machine.send("bogus"));
        assert_eq!(machine.current(), "idle");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn follows_table_rows() {
        let machine = loader();
        assert!(machine.send("start"));
        assert!(!machine.send("start"));
        assert!(machine.send("done"));
        assert_eq!(machine.current(), "ready");
    }

    #[test]
    fn guard_can_block_a_row() {
        let open = Arc::new(AtomicBool::new(false));
        let open_clone = open.clone();
        let door = fsm(
            "closed",
            vec![Transition::new("closed", "push", "open")
                .guard(move || open_clone.load(Ordering::SeqCst))],
        );

        assert!(!door.can(&"push"));
        assert!(!door.send("push"));

        open.store(true, Ordering::SeqCst);
        assert!(door.can(&"push"));
        assert!(door.send("push"));
        assert_eq!(door.current(), "open");
    }

    #[test]
    fn available_actions_reflect_current_state() {
        let machine = loader();
        assert_eq!(machine.available_actions(), vec!["start"]);

        machine.send("start");
        assert_eq!(machine.available_actions(), vec!["done", "fail"]);
    }
}
