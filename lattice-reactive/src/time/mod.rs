//! Time Layer
//!
//! Temporal operators built on [`Effect`]: `delay`, `timeout`, `interval`,
//! `debounce` and `throttle`.
//!
//! # Scheduling
//!
//! Timers run on the ambient tokio runtime. When one fires it simply calls
//! the owning container's setter, re-entering the synchronous propagation
//! model. Each operator's result owns its timers, so disposing the result
//! cancels whatever is still pending.
//!
//! # Ordering
//!
//! `delay` schedules one independent timer per emission. Two emissions with
//! the same delay arrive in order, but nothing reorders them otherwise.

mod rate;
mod timer;

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config;
use crate::error::ReactiveError;
use crate::reactive::{Container, Effect, Subscription, Trigger, Value};

pub use rate::{debounce, throttle};
pub use timer::TimerHandle;
pub(crate) use timer::{TimerSet, TimerSlot};

pub(crate) mod schedule {
    pub(crate) use super::timer::{after, every, spawn};
}

/// An effect with temporal operators.
pub struct Time<A: Value> {
    effect: Effect<A>,
    ticks: Arc<AtomicU64>,
}

impl<A: Value> Time<A> {
    /// Create a time-aware value with the given initial value.
    pub fn new(value: A) -> Self {
        Self::from(Effect::new(value))
    }

    /// Get a clone of the current value.
    pub fn value(&self) -> A {
        self.effect.value()
    }

    /// Set the value, notifying subscribers on change.
    pub fn set(&self, value: A) -> bool {
        self.effect.set(value)
    }

    /// Register a callback invoked with every new value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        self.effect.subscribe(callback)
    }

    /// Derive a time value holding `f` of this one's value.
    pub fn map<B, F>(&self, f: F) -> Time<B>
    where
        B: Value,
        F: Fn(&A) -> B + Send + Sync + 'static,
    {
        Time::from(self.effect.map(f))
    }

    /// Re-deliver every value `after` it was emitted.
    pub fn delay(&self, after: Duration) -> Time<A> {
        let source = self.as_container();
        let delayed = Container::new(source.value());
        let timers = Arc::new(TimerSet::default());

        let seed_target = delayed.clone();
        let seed = source.value();
        timers.track(schedule::after(after, move || {
            seed_target.set(seed);
        }));

        let target = delayed.clone();
        let pending = Arc::clone(&timers);
        let upstream = source.subscribe(move |value| {
            let target = target.clone();
            let value = value.clone();
            pending.track(schedule::after(after, move || {
                target.set(value);
            }));
        });

        delayed.on_dispose(move || {
            upstream.unsubscribe();
            timers.cancel_all();
        });
        Time::from(delayed)
    }

    /// Race the first emission against a clock.
    ///
    /// The result starts as `Ok(current)`. Whichever happens first, an
    /// emission or `limit` elapsing, decides it for good: `Ok(value)` or
    /// `Err(ReactiveError::Timeout)`. Later emissions are ignored.
    pub fn timeout(&self, limit: Duration) -> Time<Result<A, ReactiveError>> {
        let raced: Container<Result<A, ReactiveError>> = Container::new(Ok(self.value()));
        let resolved = Arc::new(AtomicBool::new(false));
        let upstream: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let after_ms = config::millis(limit);

        let clock_target = raced.clone();
        let clock_resolved = Arc::clone(&resolved);
        let clock_upstream = Arc::clone(&upstream);
        let clock = Arc::new(schedule::after(limit, move || {
            if clock_resolved.swap(true, Ordering::SeqCst) {
                return;
            }
            tracing::debug!(after_ms, "timeout elapsed before first emission");
            if let Some(subscription) = clock_upstream.lock().take() {
                subscription.unsubscribe();
            }
            clock_target.set(Err(ReactiveError::Timeout { after_ms }));
        }));

        if clock.is_none() {
            resolved.store(true, Ordering::SeqCst);
            raced.set(Err(ReactiveError::NoRuntime));
            return Time::from(raced);
        }

        let target = raced.clone();
        let emitted = Arc::clone(&resolved);
        let emitted_clock = Arc::clone(&clock);
        let emitted_upstream = Arc::clone(&upstream);
        let subscription = self.as_container().subscribe(move |value| {
            if emitted.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(clock) = emitted_clock.as_ref() {
                clock.cancel();
            }
            if let Some(subscription) = emitted_upstream.lock().take() {
                subscription.unsubscribe();
            }
            target.set(Ok(value.clone()));
        });
        *upstream.lock() = Some(subscription);

        // The clock may have won while we were subscribing.
        if resolved.load(Ordering::SeqCst) {
            if let Some(subscription) = upstream.lock().take() {
                subscription.unsubscribe();
            }
        }

        raced.on_dispose(move || {
            if let Some(clock) = clock.as_ref() {
                clock.cancel();
            }
            if let Some(subscription) = upstream.lock().take() {
                subscription.unsubscribe();
            }
        });
        Time::from(raced)
    }

    /// Re-notify the current value every `period` while anybody listens.
    ///
    /// The timer starts with the first subscriber and stops when the last
    /// one leaves. Each tick bumps [`Time::ticks`] and notifies subscribers
    /// even though the value did not change. Values themselves are never
    /// altered.
    pub fn interval(&self, period: Duration) -> Time<A> {
        let ticking = self.as_container().map(A::clone);
        let ticks = Arc::new(AtomicU64::new(0));
        let running = Arc::new(TimerSlot::default());

        let weak = ticking.downgrade();
        let counter = Arc::clone(&ticks);
        let slot = Arc::clone(&running);
        ticking.watch_subscribers(move |count| {
            if count == 0 {
                if slot.is_armed() {
                    tracing::debug!(?period, "interval stopped");
                    slot.cancel();
                }
                return;
            }
            if slot.is_armed() {
                return;
            }

            tracing::debug!(?period, "interval started");
            let weak = weak.clone();
            let counter = Arc::clone(&counter);
            slot.replace(schedule::every(period, move || {
                if let Some(container) = weak.upgrade() {
                    counter.fetch_add(1, Ordering::SeqCst);
                    container.force(container.value());
                }
            }));
        });

        ticking.on_dispose(move || running.cancel());
        Time {
            effect: Effect::from(ticking),
            ticks,
        }
    }

    /// Emit only after `wait` has passed without another change.
    pub fn debounce(&self, wait: Duration) -> Time<A> {
        Time::from(debounce(self.as_container(), wait))
    }

    /// Emit at most once per `window`, taking the first change in it.
    pub fn throttle(&self, window: Duration) -> Time<A> {
        Time::from(throttle(self.as_container(), window))
    }

    /// Number of interval ticks delivered so far. Zero for non-interval values.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.effect.subscriber_count()
    }

    /// Cancel pending timers and release upstream subscriptions.
    pub fn dispose(&self) {
        self.effect.dispose();
    }

    /// Borrow the underlying effect.
    pub fn as_effect(&self) -> &Effect<A> {
        &self.effect
    }

    /// Borrow the underlying container.
    pub fn as_container(&self) -> &Container<A> {
        self.effect.as_container()
    }

    /// Unwrap into the underlying effect.
    pub fn into_effect(self) -> Effect<A> {
        self.effect
    }
}

impl<A: Value> From<Effect<A>> for Time<A> {
    fn from(effect: Effect<A>) -> Self {
        Self {
            effect,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<A: Value> From<Container<A>> for Time<A> {
    fn from(container: Container<A>) -> Self {
        Self::from(Effect::from(container))
    }
}

impl<A: Value> Clone for Time<A> {
    fn clone(&self) -> Self {
        Self {
            effect: self.effect.clone(),
            ticks: Arc::clone(&self.ticks),
        }
    }
}

impl<A: Value + Debug> Debug for Time<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Time")
            .field("value", &self.value())
            .field("ticks", &self.ticks())
            .finish()
    }
}

impl<A: Value> Trigger for Time<A> {
    fn watch(&self, notify: Arc<dyn Fn() + Send + Sync>) -> Subscription {
        self.as_container().watch(notify)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn delay_redelivers_after_wait() {
        let source = Time::new(1);
        let delayed = source.delay(ms(50));

        source.set(2);
        assert_eq!(delayed.value(), 1);

        sleep(ms(60)).await;
        assert_eq!(delayed.value(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_delay_cancels_pending_writes() {
        let source = Time::new(1);
        let delayed = source.delay(ms(50));
        source.set(2);
        delayed.dispose();

        sleep(ms(60)).await;
        assert_eq!(delayed.value(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_resolves_with_first_emission() {
        let source = Time::new(0);
        let raced = source.timeout(ms(100));

        source.set(7);
        assert_eq!(raced.value(), Ok(7));

        source.set(8);
        sleep(ms(200)).await;
        assert_eq!(raced.value(), Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fails_when_clock_wins() {
        let source = Time::new(0);
        let raced = source.timeout(ms(100));

        sleep(ms(150)).await;
        assert_eq!(raced.value(), Err(ReactiveError::Timeout { after_ms: 100 }));

        source.set(1);
        assert_eq!(raced.value(), Err(ReactiveError::Timeout { after_ms: 100 }));
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn timeout_without_runtime_reports_it() {
        let raced = Time::new(0).timeout(ms(10));
        assert_eq!(raced.value(), Err(ReactiveError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_ref_counted() {
        let source = Time::new("beat".to_string());
        let ticking = source.interval(ms(10));

        sleep(ms(50)).await;
        assert_eq!(ticking.ticks(), 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let subscription = ticking.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        sleep(ms(35)).await;
        assert_eq!(ticking.ticks(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(ticking.value(), "beat");

        subscription.unsubscribe();
        sleep(ms(50)).await;
        assert_eq!(ticking.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_follows_source_value() {
        let source = Time::new(1);
        let ticking = source.interval(ms(10));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = ticking.subscribe(move |v| seen_clone.lock().push(*v));

        sleep(ms(15)).await;
        source.set(2);
        sleep(ms(10)).await;

        assert_eq!(*seen.lock(), vec![1, 2, 2]);
    }
}
