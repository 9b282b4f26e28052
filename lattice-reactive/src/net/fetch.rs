//! Fetch Implementation
//!
//! A [`Fetch`] models an asynchronous request as an [`Effect`] over
//! [`AsyncState`]: it starts out loading and settles into either data or an
//! error. Nothing is ever thrown across the container boundary.
//!
//! # Cycles
//!
//! A cycle is one run of the fetcher, including any retries. Cycles start
//! on construction and again whenever a dependency emits. Each cycle takes a
//! sequence number; when it completes, it only writes its result if no newer
//! cycle has been issued since. A slow early request therefore cannot
//! clobber a fast later one.
//!
//! # Derived fetches
//!
//! `retry`, `cache` and `refetch` never touch the instance they are called
//! on. They build a new `Fetch` sharing the fetcher and dependencies, and the
//! caller adopts it.
//!
//! `cache` is the exception on a miss: the new fetch follows the instance it
//! was built from and mirrors its successful results into the store, so no
//! second request goes out.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::store::{self, KeyValueStore};
use crate::config;
use crate::error::ReactiveError;
use crate::reactive::{Container, Effect, Subscription, Trigger, Value};
use crate::time::{schedule, TimerSlot};

/// The tri-state value carried by a fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncState<A> {
    pub data: Option<A>,
    pub loading: bool,
    pub error: Option<ReactiveError>,
}

impl<A> AsyncState<A> {
    /// Loading, with no data or error.
    pub fn pending() -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
        }
    }

    /// Settled on `data`.
    pub fn ready(data: A) -> Self {
        Self {
            data: Some(data),
            loading: false,
            error: None,
        }
    }

    /// Settled on `error`.
    pub fn failed(error: ReactiveError) -> Self {
        Self {
            data: None,
            loading: false,
            error: Some(error),
        }
    }

    fn settled(outcome: Result<A, ReactiveError>) -> Self {
        match outcome {
            Ok(data) => Self::ready(data),
            Err(error) => Self::failed(error),
        }
    }
}

type Fetcher<A> = Arc<dyn Fn() -> BoxFuture<'static, Result<A, ReactiveError>> + Send + Sync>;

/// Drives the cycles of one fetch instance.
struct Runner<A: Value> {
    state: Effect<AsyncState<A>>,
    fetcher: Fetcher<A>,
    retries: u32,
    issued: AtomicU64,
    /// The task of the latest cycle.
    cycle: TimerSlot,
}

impl<A: Value> Runner<A> {
    fn new(fetcher: Fetcher<A>, retries: u32, seed: AsyncState<A>) -> Arc<Self> {
        let runner = Arc::new(Self {
            state: Effect::new(seed),
            fetcher,
            retries,
            issued: AtomicU64::new(0),
            cycle: TimerSlot::default(),
        });

        let weak = Arc::downgrade(&runner);
        runner.state.as_container().on_dispose(move || {
            if let Some(runner) = weak.upgrade() {
                runner.cycle.cancel();
            }
        });
        runner
    }

    /// Start a new cycle, aborting the one in flight.
    fn run(self: &Arc<Self>) {
        let cycle = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(fetch = self.state.id(), cycle, "fetch cycle started");
        self.state.set(AsyncState::pending());

        let runner = Arc::clone(self);
        let task = schedule::spawn(async move {
            let outcome = runner.attempt().await;
            runner.settle(cycle, outcome);
        });

        if task.is_none() {
            self.settle(cycle, Err(ReactiveError::NoRuntime));
        }
        self.cycle.replace(task);
    }

    /// One initial attempt plus up to `retries` more with exponential backoff.
    async fn attempt(&self) -> Result<A, ReactiveError> {
        let base = config::current().retry_backoff();
        let mut retried = 0u32;
        loop {
            match (self.fetcher)().await {
                Ok(data) => return Ok(data),
                Err(error) if retried < self.retries => {
                    retried += 1;
                    let backoff = base.saturating_mul(2u32.saturating_pow(retried - 1));
                    tracing::debug!(
                        fetch = self.state.id(),
                        attempt = retried,
                        ?backoff,
                        %error,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn settle(&self, cycle: u64, outcome: Result<A, ReactiveError>) {
        let latest = self.issued.load(Ordering::SeqCst);
        if cycle != latest {
            tracing::debug!(fetch = self.state.id(), cycle, latest, "discarding stale fetch result");
            return;
        }
        if let Err(error) = &outcome {
            tracing::debug!(fetch = self.state.id(), cycle, %error, "fetch failed");
        }
        self.state.set(AsyncState::settled(outcome));
    }
}

/// An asynchronous request exposed as a reactive value.
///
/// # Example
///
/// ```rust,ignore
/// let user_id = Container::new(1);
/// let id = user_id.clone();
/// let user = Fetch::new(move || load_user(id.value())).depends_on(user_id.clone());
///
/// user.subscribe(|state| render(state));
/// user_id.set(2); // starts another cycle on the same instance
/// ```
pub struct Fetch<A: Value> {
    runner: Arc<Runner<A>>,
    deps: Vec<Arc<dyn Trigger>>,
}

impl<A: Value> Fetch<A> {
    /// Start fetching immediately.
    pub fn new<F, Fut, E>(fetcher: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, E>> + Send + 'static,
        E: Display,
    {
        let fetcher: Fetcher<A> = Arc::new(move || {
            fetcher()
                .map(|outcome| outcome.map_err(ReactiveError::network))
                .boxed()
        });
        Self::launch(fetcher, 0)
    }

    fn launch(fetcher: Fetcher<A>, retries: u32) -> Self {
        let runner = Runner::new(fetcher, retries, AsyncState::pending());
        runner.run();
        Self {
            runner,
            deps: Vec::new(),
        }
    }

    fn idle(fetcher: Fetcher<A>, retries: u32, seed: AsyncState<A>) -> Self {
        Self {
            runner: Runner::new(fetcher, retries, seed),
            deps: Vec::new(),
        }
    }

    /// Start a new cycle whenever `dependency` emits.
    pub fn depends_on(self, dependency: impl Trigger + 'static) -> Self {
        self.wire(Arc::new(dependency))
    }

    fn wire(mut self, dependency: Arc<dyn Trigger>) -> Self {
        let runner = Arc::clone(&self.runner);
        let subscription = dependency.watch(Arc::new(move || runner.run()));
        self.runner
            .state
            .as_container()
            .on_dispose(move || subscription.unsubscribe());
        self.deps.push(dependency);
        self
    }

    /// Build a sibling fetch with the same dependencies.
    fn derive(&self, fetcher: Fetcher<A>, retries: u32, seed: Option<AsyncState<A>>) -> Fetch<A> {
        let fetch = match seed {
            Some(seed) => Self::idle(fetcher, retries, seed),
            None => Self::launch(fetcher, retries),
        };
        self.deps
            .iter()
            .fold(fetch, |fetch, dep| fetch.wire(Arc::clone(dep)))
    }

    /// A new fetch that retries up to `attempts` extra times per cycle.
    ///
    /// Retry `k` waits `backoff * 2^(k-1)`, where `backoff` comes from the
    /// engine configuration.
    pub fn retry(&self, attempts: u32) -> Fetch<A> {
        self.derive(Arc::clone(&self.runner.fetcher), attempts, None)
    }

    /// A new fetch with a fresh execution of the same fetcher.
    pub fn refetch(&self) -> Fetch<A> {
        self.derive(Arc::clone(&self.runner.fetcher), self.runner.retries, None)
    }

    /// A new fetch backed by `store`.
    ///
    /// If `key` holds an entry younger than `ttl`, the new fetch starts out
    /// settled on it and makes no request; later dependency cycles fetch
    /// again. Otherwise the new fetch follows this one and takes over its
    /// states, so the request already in flight is the only one. A disposed
    /// fetch cannot be followed, and the new fetch then runs its own cycle.
    ///
    /// Every successful result is written back with the current timestamp.
    /// `ttl` defaults to the configured cache ttl.
    pub fn cache(
        &self,
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Fetch<A>
    where
        A: Serialize + DeserializeOwned,
    {
        let key: String = key.into();
        let ttl = ttl.unwrap_or_else(|| config::current().cache_ttl());

        let inner = Arc::clone(&self.runner.fetcher);
        let mirror_store = Arc::clone(&store);
        let mirror_key = key.clone();
        let fetcher: Fetcher<A> = Arc::new(move || {
            let store = Arc::clone(&mirror_store);
            let key = mirror_key.clone();
            inner()
                .map(move |outcome| {
                    if let Ok(data) = &outcome {
                        store::save_stamped(store.as_ref(), &key, data);
                    }
                    outcome
                })
                .boxed()
        });

        if let Some(hit) = store::load_fresh::<A>(store.as_ref(), &key, ttl) {
            tracing::debug!(%key, "serving fetch from cache");
            return self.derive(fetcher, self.runner.retries, Some(AsyncState::ready(hit)));
        }
        if self.runner.state.is_disposed() {
            return self.derive(fetcher, self.runner.retries, None);
        }

        // Dependencies are left unwired: the followed fetch already reacts
        // to them, and its states arrive through the mirror below.
        let cached = Fetch {
            runner: Runner::new(fetcher, self.runner.retries, self.value()),
            deps: self.deps.clone(),
        };
        let mirror = {
            let target = cached.runner.state.clone();
            move |state: &AsyncState<A>| {
                if let Some(data) = &state.data {
                    store::save_stamped(store.as_ref(), &key, data);
                }
                target.set(state.clone());
            }
        };
        mirror(&self.value());
        let upstream = self.runner.state.subscribe(mirror);
        cached
            .runner
            .state
            .as_container()
            .on_dispose(move || upstream.unsubscribe());
        cached
    }

    /// Get a clone of the current state.
    pub fn value(&self) -> AsyncState<A> {
        self.runner.state.value()
    }

    /// Whether a cycle is in flight.
    pub fn is_loading(&self) -> bool {
        self.runner.state.as_container().with_value(|state| state.loading)
    }

    /// Data of the latest cycle, if it succeeded.
    pub fn data(&self) -> Option<A> {
        self.runner.state.as_container().with_value(|state| state.data.clone())
    }

    /// Error of the latest cycle, if it failed.
    pub fn error(&self) -> Option<ReactiveError> {
        self.runner.state.as_container().with_value(|state| state.error.clone())
    }

    /// Register a callback invoked with every state change.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AsyncState<A>) + Send + Sync + 'static,
    {
        self.runner.state.subscribe(callback)
    }

    /// Cancel in-flight work and detach from dependencies.
    pub fn dispose(&self) {
        self.runner.state.dispose();
    }

    /// Borrow the state effect.
    pub fn as_effect(&self) -> &Effect<AsyncState<A>> {
        &self.runner.state
    }

    /// Borrow the state container.
    pub fn as_container(&self) -> &Container<AsyncState<A>> {
        self.runner.state.as_container()
    }
}

/// Shorthand for [`Fetch::new`].
pub fn fetch<A, F, Fut, E>(fetcher: F) -> Fetch<A>
where
    A: Value,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, E>> + Send + 'static,
    E: Display,
{
    Fetch::new(fetcher)
}

impl<A: Value> Clone for Fetch<A> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            deps: self.deps.clone(),
        }
    }
}

impl<A: Value + Debug> Debug for Fetch<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetch")
            .field("state", &self.value())
            .field("retries", &self.runner.retries)
            .field("dependencies", &self.deps.len())
            .finish()
    }
}

impl<A: Value> Trigger for Fetch<A> {
    fn watch(&self, notify: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.runner.state.watch(notify)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
