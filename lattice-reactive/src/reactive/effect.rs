//! Effect Implementation
//!
//! An Effect is a container that can sequence dependent reactive
//! computations with `bind`.
//!
//! # How Bind Works
//!
//! `source.bind(f)` produces a result effect seeded with `f(source).value()`.
//! Every time the source emits `v`:
//!
//! 1. `inner = f(v)` is computed and its value written into the result.
//! 2. The subscription on the previous inner effect is torn down.
//! 3. The result subscribes to `inner`, so later changes of `inner` flow
//!    through as well.
//!
//! Only the latest inner effect is ever live ("switch" semantics). The
//! result owns both its source subscription and the inner one, and releases
//! them on [`Effect::dispose`].
//!
//! # Laws
//!
//! Observed by value at every instant:
//!
//! - left identity: `Effect::pure(a).bind(f) == f(a)`
//! - right identity: `m.bind(Effect::pure) == m`
//! - associativity: `m.bind(f).bind(g) == m.bind(|a| f(a).bind(g))`

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::Mutex;

use super::container::{Container, DisposeGuard, Trigger, Value};
use super::subscriber::Subscription;

/// A container with monadic sequencing.
pub struct Effect<A: Value> {
    container: Container<A>,
}

impl<A: Value> Effect<A> {
    /// Create a new effect with the given initial value.
    pub fn new(value: A) -> Self {
        Self {
            container: Container::new(value),
        }
    }

    /// Lift a plain value. Alias of [`Effect::new`] under its monadic name.
    pub fn pure(value: A) -> Self {
        Self::new(value)
    }

    /// Get the effect's unique ID (shared with its container).
    pub fn id(&self) -> u64 {
        self.container.id()
    }

    /// Get a clone of the current value.
    pub fn value(&self) -> A {
        self.container.value()
    }

    /// Set the value, notifying subscribers on change. Returns whether it changed.
    pub fn set(&self, value: A) -> bool {
        self.container.set(value)
    }

    /// Register a callback invoked with every new value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.container.subscribe(callback)
    }

    /// Derive an effect holding `f` of this one's value.
    pub fn map<B, F>(&self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Effect::from(self.container.map(f))
    }

    /// Sequence a dependent effect. See the module docs for the exact rules.
    pub fn bind<B, F>(&self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(&A) -> Effect<B> + Send + Sync + 'static,
    {
        let first = f(&self.value());
        let result = Effect::new(first.value());
        let inner: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        switch_to(&result, &inner, &first);

        let target = result.clone();
        let slot = Arc::clone(&inner);
        let outer = self.container.subscribe(move |value| {
            let next = f(value);
            target.set(next.value());
            switch_to(&target, &slot, &next);
        });

        result.container.on_dispose(move || {
            outer.unsubscribe();
            if let Some(current) = inner.lock().take() {
                current.unsubscribe();
            }
        });
        result
    }

    /// Alias of [`Effect::bind`].
    pub fn chain<B, F>(&self, f: F) -> Effect<B>
    where
        B: Value,
        F: Fn(&A) -> Effect<B> + Send + Sync + 'static,
    {
        self.bind(f)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.container.subscriber_count()
    }

    /// Release upstream subscriptions and drop all subscribers.
    pub fn dispose(&self) {
        self.container.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.container.is_disposed()
    }

    /// Dispose this effect when the returned guard is dropped.
    pub fn scoped(&self) -> DisposeGuard<A> {
        self.container.scoped()
    }

    /// Borrow the underlying container.
    pub fn as_container(&self) -> &Container<A> {
        &self.container
    }

    /// Unwrap into the underlying container.
    pub fn into_container(self) -> Container<A> {
        self.container
    }
}

/// Replace the live inner subscription of a bound effect.
fn switch_to<B: Value>(target: &Effect<B>, slot: &Mutex<Option<Subscription>>, inner: &Effect<B>) {
    let previous = slot.lock().take();
    if let Some(previous) = previous {
        previous.unsubscribe();
    }

    let target = target.clone();
    let subscription = inner.subscribe(move |value| {
        target.set(value.clone());
    });
    *slot.lock() = Some(subscription);
}

impl<A: Value> From<Container<A>> for Effect<A> {
    fn from(container: Container<A>) -> Self {
        Self { container }
    }
}

impl<A: Value> Clone for Effect<A> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
        }
    }
}

impl<A: Value> PartialEq for Effect<A> {
    fn eq(&self, other: &Self) -> bool {
        self.container == other.container
    }
}

impl<A: Value + Debug> Debug for Effect<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("value", &self.value())
            .finish()
    }
}

impl<A: Value> Trigger for Effect<A> {
    fn watch(&self, notify: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.container.watch(notify)
    }
}

/// A function that can travel through a container.
///
/// Equality is pointer identity, so re-setting the same `Func` is not a change.
pub struct Func<A, B>(Arc<dyn Fn(&A) -> B + Send + Sync>);

impl<A, B> Func<A, B> {
    /// Wrap a closure. Each call creates a distinct identity.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the wrapped function.
    pub fn call(&self, arg: &A) -> B {
        (self.0)(arg)
    }
}

impl<A, B> Clone for Func<A, B> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<A, B> PartialEq for Func<A, B> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<A, B> Debug for Func<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Func(..)")
    }
}

/// Collapse an effect of effects.
pub fn flatten<A: Value>(nested: &Effect<Effect<A>>) -> Effect<A> {
    nested.bind(|inner| inner.clone())
}

/// Applicative application: `ef.bind(|f| ea.map(f))`.
///
/// Each new function gets its own node mapped over `ea`. The node built for
/// the previous function is disposed first, so `ea` only ever carries one
/// subscription from this result.
pub fn apply<A, B>(ef: &Effect<Func<A, B>>, ea: &Effect<A>) -> Effect<B>
where
    A: Value,
    B: Value,
{
    let ea = ea.clone();
    let live: Arc<Mutex<Option<Effect<B>>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&live);
    let applied = ef.bind(move |f| {
        let stale = slot.lock().take();
        if let Some(stale) = stale {
            stale.dispose();
        }
        let f = f.clone();
        let mapped = ea.map(move |a| f.call(a));
        *slot.lock() = Some(mapped.clone());
        mapped
    });

    applied.container.on_dispose(move || {
        if let Some(mapped) = live.lock().take() {
            mapped.dispose();
        }
    });
    applied
}

/// Snapshot a list of effects into one effect of their current values.
///
/// Later emissions on the inputs do not update the result.
pub fn sequence<A: Value>(effects: &[Effect<A>]) -> Effect<Vec<A>> {
    effects
        .iter()
        .fold(Effect::pure(Vec::with_capacity(effects.len())), |acc, effect| {
            let value = effect.value();
            let next = acc.map(move |values: &Vec<A>| {
                let mut values = values.clone();
                values.push(value.clone());
                values
            });
            acc.dispose();
            next
        })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
