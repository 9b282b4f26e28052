//! Reducer-driven state machine.
//!
//! A [`Machine`] folds actions into state through a reducer. Subscribers
//! hear about a new state only when the reducer returns something different
//! from the current one.

use std::sync::Arc;

use crate::reactive::{Container, Subscription, Value};

type Dispatch<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// A state container that only changes through its reducer.
pub struct Machine<S: Value, A> {
    state: Container<S>,
    dispatch: Dispatch<A>,
}

impl<S: Value, A: 'static> Machine<S, A> {
    /// Create a machine in state `initial`.
    pub fn new<R>(initial: S, reducer: R) -> Self
    where
        R: Fn(&S, &A) -> S + Send + Sync + 'static,
    {
        let state = Container::new(initial);
        let target = state.clone();
        let dispatch: Dispatch<A> = Arc::new(move |action: &A| {
            let next = reducer(&target.value(), action);
            if !target.set(next) {
                tracing::trace!(machine = target.id(), "action left state unchanged");
            }
        });
        Self { state, dispatch }
    }

    /// Feed an action through the reducer.
    pub fn send(&self, action: A) {
        (self.dispatch)(&action);
    }

    /// Get the current state.
    pub fn state(&self) -> S {
        self.state.value()
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

impl<S: Value, A> Clone for Machine<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

/// Shorthand for [`Machine::new`].
pub fn machine<S, A, R>(initial: S, reducer: R) -> Machine<S, A>
where
    S: Value,
    A: 'static,
    R: Fn(&S, &A) -> S + Send + Sync + 'static,
{
    Machine::new(initial, reducer)
}

/// An action addressed to one half of a combined machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed<L, R> {
    Left(L),
    Right(R),
}

/// Run two machines side by side as one machine over the pair of states.
///
/// Actions are routed to the matching machine; the pair updates whenever
/// either side changes, including when a side is driven directly.
pub fn combine<S1, A1, S2, A2>(
    left: &Machine<S1, A1>,
    right: &Machine<S2, A2>,
) -> Machine<(S1, S2), Routed<A1, A2>>
where
    S1: Value,
    S2: Value,
    A1: 'static,
    A2: 'static,
{
    let product = Container::new((left.state(), right.state()));

    let target = product.clone();
    let from_left = left.subscribe(move |s1| {
        target.update(|(_, s2)| (s1.clone(), s2.clone()));
    });
    let target = product.clone();
    let from_right = right.subscribe(move |s2| {
        target.update(|(s1, _)| (s1.clone(), s2.clone()));
    });
    product.on_dispose(move || {
        from_left.unsubscribe();
        from_right.unsubscribe();
    });

    let to_left = Arc::clone(&left.dispatch);
    let to_right = Arc::clone(&right.dispatch);
    Machine {
        state: product,
        dispatch: Arc::new(move |action: &Routed<A1, A2>| match action {
            Routed::Left(action) => to_left(action),
            Routed::Right(action) => to_right(action),
        }),
    }
}
