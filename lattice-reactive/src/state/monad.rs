//! State-monad style wrapper.
//!
//! A [`State`] pairs a reactive value channel with a private state. Each
//! operation returns a brand-new wrapper; the only mutation is `put` and
//! `modify` updating the caller's own state. Threading `get` -> `put` ->
//! `modify` is the caller's job, as with any textbook State monad.

use std::fmt::Debug;

use crate::reactive::{Effect, Value};

/// A reactive value paired with a threaded state.
pub struct State<S, A: Value> {
    channel: Effect<A>,
    current: S,
}

impl<S: Clone, A: Value> State<S, A> {
    /// Pair `state` with a fresh channel holding `value`.
    pub fn new(state: S, value: A) -> Self {
        Self {
            channel: Effect::new(value),
            current: state,
        }
    }

    /// Borrow the current state.
    pub fn state(&self) -> &S {
        &self.current
    }

    /// Get the channel's current value.
    pub fn value(&self) -> A {
        self.channel.value()
    }

    /// Borrow the reactive value channel.
    pub fn channel(&self) -> &Effect<A> {
        &self.channel
    }

    /// Snapshot the current state as both state and value.
    pub fn get(&self) -> State<S, S>
    where
        S: Value,
    {
        State::new(self.current.clone(), self.current.clone())
    }

    /// Replace this wrapper's state and return a wrapper seeded with it.
    pub fn put(&mut self, state: S) -> State<S, S>
    where
        S: Value,
    {
        self.current = state.clone();
        State::new(state.clone(), state)
    }

    /// `put` of `f` applied to the current state.
    pub fn modify(&mut self, f: impl FnOnce(&S) -> S) -> State<S, S>
    where
        S: Value,
    {
        let next = f(&self.current);
        self.put(next)
    }

    /// Map the value channel, keeping the state.
    pub fn map<B, F>(&self, f: F) -> State<S, B>
    where
        B: Value,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        State {
            channel: self.channel.map(f),
            current: self.current.clone(),
        }
    }

    /// The `(state, value)` pair.
    pub fn run(&self) -> (S, A) {
        (self.current.clone(), self.value())
    }
}

impl<S: Debug + Clone, A: Value + Debug> Debug for State<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("state", &self.current)
            .field("value", &self.value())
            .finish()
    }
}
