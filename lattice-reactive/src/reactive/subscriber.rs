//! Subscriber handles for the reactive system.
//!
//! Every callback registered on a container gets a [`SubscriberId`] and the
//! caller receives a [`Subscription`] that can remove it again. Dropping a
//! `Subscription` does NOT unsubscribe; use [`Subscription::guard`] when the
//! callback should live exactly as long as some scope.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered callback.
///
/// IDs come from a global atomic counter, so they are unique across every
/// container in the process and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Cancel = Box<dyn FnOnce() + Send>;

/// The unsubscribe side of a `subscribe` call.
pub struct Subscription {
    id: SubscriberId,
    cancel: Option<Cancel>,
}

impl Subscription {
    pub(crate) fn new<F>(id: SubscriberId, cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to undo.
    pub(crate) fn noop() -> Self {
        Self {
            id: SubscriberId::new(),
            cancel: None,
        }
    }

    /// Get the ID of the registered callback.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback from its container.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Convert into a guard that unsubscribes when dropped.
    pub fn guard(self) -> SubscriptionGuard {
        SubscriptionGuard(Some(self))
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("live", &self.cancel.is_some())
            .finish()
    }
}

/// Scoped subscription: unsubscribes on drop.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard(Option<Subscription>);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(subscription) = self.0.take() {
            subscription.unsubscribe();
        }
    }
}
