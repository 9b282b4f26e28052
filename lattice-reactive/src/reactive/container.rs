//! Container Implementation
//!
//! A Container is the fundamental reactive primitive. It holds a value and a
//! set of subscriber callbacks.
//!
//! # How Containers Work
//!
//! 1. A container is created with an initial value and no subscribers.
//!
//! 2. `set` compares the new value with the current one. Equal values are
//!    dropped without notifying anybody.
//!
//! 3. A changed value is stored and every subscriber is called synchronously,
//!    in registration order, before `set` returns. Derived containers are just
//!    subscribers that call `set` on another container, so a change flows
//!    depth-first through the whole chain within the same call.
//!
//! # Disposal
//!
//! Derived containers privately hold subscriptions on their sources, and
//! time-based ones hold timers. All of that is recorded in a teardown list
//! that [`Container::dispose`] runs exactly once. After disposal `set` is a
//! no-op, so late timer or network completions land nowhere.
//!
//! # Thread Safety
//!
//! Containers are `Send + Sync` handles around an `Arc`. Storing a value and
//! notifying subscribers happen under a per-container re-entrant lock, so
//! writers on different threads deliver in the order they stored. The value
//! and subscriber locks are released before callbacks run, so callbacks may
//! read, set, subscribe to or dispose any container, including the one
//! notifying them.
//!
//! A write made from inside a callback supersedes the delivery in progress:
//! subscribers not yet reached only see the newer value.
//!
//! Two containers that set each other from different threads at the same
//! time can deadlock on those locks. Acyclic graphs cannot.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use smallvec::SmallVec;

use super::subscriber::{SubscriberId, Subscription};

/// Bounds shared by every value a container can hold.
///
/// `PartialEq` is what decides whether a write is a change.
pub trait Value: Clone + PartialEq + Send + Sync + 'static {}

impl<T> Value for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Anything that can announce "something changed" without caring about the
/// value type. Used to wire fetch dependencies.
pub trait Trigger: Send + Sync {
    fn watch(&self, notify: Arc<dyn Fn() + Send + Sync>) -> Subscription;
}

/// Counter for generating unique container IDs.
static CONTAINER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_container_id() -> u64 {
    CONTAINER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;
type CountWatcher = Arc<dyn Fn(usize) + Send + Sync>;
type Teardown = Box<dyn FnOnce() + Send>;

struct Shared<A> {
    id: u64,
    value: RwLock<A>,
    /// Bumped on every stored write; a delivery stops once it is outdated.
    version: AtomicU64,
    /// Held across store and notify so concurrent writers cannot interleave.
    serial: ReentrantMutex<()>,
    /// Insertion-ordered so notification order matches registration order.
    subscribers: RwLock<IndexMap<SubscriberId, Callback<A>>>,
    /// Observers of the subscriber count (used by ref-counted timers).
    watchers: RwLock<Vec<CountWatcher>>,
    teardown: Mutex<Vec<Teardown>>,
    disposed: AtomicBool,
}

/// A reactive cell holding a value of type `A`.
///
/// # Example
///
/// ```rust
/// use lattice_reactive::reactive::Container;
///
/// let base = Container::new(5);
/// let doubled = base.map(|x| x * 2);
///
/// base.set(10);
/// assert_eq!(doubled.value(), 20);
/// ```
pub struct Container<A: Value> {
    shared: Arc<Shared<A>>,
}

impl<A: Value> Container<A> {
    /// Create a new container with the given initial value.
    pub fn new(value: A) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: next_container_id(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                serial: ReentrantMutex::new(()),
                subscribers: RwLock::new(IndexMap::new()),
                watchers: RwLock::new(Vec::new()),
                teardown: Mutex::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Get the container's unique ID.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Get a clone of the current value.
    pub fn value(&self) -> A {
        self.shared.value.read().clone()
    }

    /// Borrow the current value without cloning it.
    ///
    /// The value is read-locked while `f` runs, so `f` must not write to
    /// this container.
    pub fn with_value<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.shared.value.read())
    }

    /// Store `value` and notify subscribers if it differs from the current one.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: A) -> bool {
        let _serial = self.shared.serial.lock();
        if self.is_disposed() {
            return false;
        }

        let version = {
            let mut guard = self.shared.value.write();
            if *guard == value {
                return false;
            }
            *guard = value.clone();
            self.shared.version.fetch_add(1, Ordering::SeqCst) + 1
        };

        self.notify(&value, version);
        true
    }

    /// Set a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&A) -> A) -> bool {
        let current = self.value();
        self.set(f(&current))
    }

    /// Store `value` and notify even if it compares equal.
    pub(crate) fn force(&self, value: A) {
        let _serial = self.shared.serial.lock();
        if self.is_disposed() {
            return;
        }
        let version = {
            let mut guard = self.shared.value.write();
            *guard = value.clone();
            self.shared.version.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.notify(&value, version);
    }

    /// Register a callback invoked with every new value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        if self.is_disposed() {
            return Subscription::noop();
        }

        let id = SubscriberId::new();
        let count = {
            let mut subscribers = self.shared.subscribers.write();
            subscribers.insert(id, Arc::new(callback));
            subscribers.len()
        };
        self.notify_watchers(count);

        let weak: Weak<Shared<A>> = Arc::downgrade(&self.shared);
        Subscription::new(id, move || {
            if let Some(shared) = weak.upgrade() {
                Container { shared }.remove(id);
            }
        })
    }

    fn remove(&self, id: SubscriberId) {
        let removed = {
            let mut subscribers = self.shared.subscribers.write();
            subscribers
                .shift_remove(&id)
                .map(|_| subscribers.len())
        };
        if let Some(count) = removed {
            self.notify_watchers(count);
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    /// Derive a container holding `f` of this container's value.
    ///
    /// The derived container stays subscribed to `self` until it is disposed.
    pub fn map<B, F>(&self, f: F) -> Container<B>
    where
        B: Value,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        let derived = Container::new(f(&self.value()));
        let target = derived.clone();
        let upstream = self.subscribe(move |value| {
            target.set(f(value));
        });
        derived.on_dispose(move || upstream.unsubscribe());
        derived
    }

    /// Record work to run when this container is disposed.
    ///
    /// Runs immediately if the container is already disposed.
    pub(crate) fn on_dispose<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_disposed() {
            teardown();
            return;
        }
        self.shared.teardown.lock().push(Box::new(teardown));
    }

    /// Observe changes to the subscriber count.
    pub(crate) fn watch_subscribers<F>(&self, watcher: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.shared.watchers.write().push(Arc::new(watcher));
    }

    /// Release upstream subscriptions and timers, and drop all subscribers.
    ///
    /// Idempotent. After disposal the container keeps its last value but
    /// ignores writes.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let teardown = std::mem::take(&mut *self.shared.teardown.lock());
        tracing::trace!(
            container = self.id(),
            teardown = teardown.len(),
            "disposing container"
        );
        for release in teardown {
            release();
        }

        self.shared.subscribers.write().clear();
        self.shared.watchers.write().clear();
    }

    /// Check if the container has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Dispose this container when the returned guard is dropped.
    pub fn scoped(&self) -> DisposeGuard<A> {
        DisposeGuard(self.clone())
    }

    /// A handle that does not keep the container alive.
    pub(crate) fn downgrade(&self) -> WeakContainer<A> {
        WeakContainer(Arc::downgrade(&self.shared))
    }

    fn notify(&self, value: &A, version: u64) {
        let callbacks: SmallVec<[Callback<A>; 4]> =
            self.shared.subscribers.read().values().cloned().collect();

        tracing::trace!(
            container = self.id(),
            subscribers = callbacks.len(),
            version,
            "notifying subscribers"
        );

        for callback in callbacks {
            if self.shared.version.load(Ordering::SeqCst) != version {
                tracing::trace!(container = self.id(), version, "delivery superseded");
                break;
            }
            callback(value);
        }
    }

    fn notify_watchers(&self, count: usize) {
        let watchers: SmallVec<[CountWatcher; 2]> =
            self.shared.watchers.read().iter().cloned().collect();
        for watcher in watchers {
            watcher(count);
        }
    }
}

impl<A: Value> Clone for Container<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Containers compare by identity: two handles are equal when they share state.
impl<A: Value> PartialEq for Container<A> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<A: Value + Debug> Debug for Container<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id())
            .field("value", &self.value())
            .field("subscriber_count", &self.subscriber_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<A: Value> Trigger for Container<A> {
    fn watch(&self, notify: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.subscribe(move |_| notify())
    }
}

/// Non-owning container handle, for closures the container itself stores.
pub(crate) struct WeakContainer<A: Value>(Weak<Shared<A>>);

impl<A: Value> WeakContainer<A> {
    pub(crate) fn upgrade(&self) -> Option<Container<A>> {
        self.0.upgrade().map(|shared| Container { shared })
    }
}

impl<A: Value> Clone for WeakContainer<A> {
    fn clone(&self) -> Self {
        Self(Weak::clone(&self.0))
    }
}

/// Disposes its container on drop.
#[must_use = "dropping the guard disposes the container immediately"]
pub struct DisposeGuard<A: Value>(Container<A>);

impl<A: Value> DisposeGuard<A> {
    pub fn container(&self) -> &Container<A> {
        &self.0
    }
}

impl<A: Value> Drop for DisposeGuard<A> {
    fn drop(&mut self) {
        self.0.dispose();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
