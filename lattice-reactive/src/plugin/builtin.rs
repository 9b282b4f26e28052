//! Built-in plugins.

use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Plugin;
use crate::config;
use crate::error::ReactiveError;
use crate::net::{self, KeyValueStore};
use crate::reactive::{Container, Value};
use crate::time::{self, schedule, TimerSet};

/// Map every value through `f`.
pub fn transform<A, F>(f: F) -> Plugin<A>
where
    A: Value,
    F: Fn(&A) -> A + Send + Sync + 'static,
{
    let f = Arc::new(f);
    Plugin::new("transform", move |input: &Container<A>| {
        let f = Arc::clone(&f);
        input.map(move |value| f(value))
    })
}

/// Only let through values matching `predicate`; others keep the last one.
///
/// The seed is taken as-is, since there is no earlier value to fall back on.
pub fn filter<A, P>(predicate: P) -> Plugin<A>
where
    A: Value,
    P: Fn(&A) -> bool + Send + Sync + 'static,
{
    let predicate = Arc::new(predicate);
    Plugin::new("filter", move |input: &Container<A>| {
        let output = Container::new(input.value());
        let target = output.clone();
        let predicate = Arc::clone(&predicate);
        let upstream = input.subscribe(move |value| {
            if predicate(value) {
                target.set(value.clone());
            }
        });
        output.on_dispose(move || upstream.unsubscribe());
        output
    })
}

/// [`validate_with`] without a rejection callback.
pub fn validate<A, V>(validator: V) -> Plugin<A>
where
    A: Value,
    V: Fn(&A) -> bool + Send + Sync + 'static,
{
    validate_with(validator, |_: &A, _: &ReactiveError| {})
}

/// Pass valid values through. Each rejected value is reported to
/// `on_invalid` and dropped; nothing is thrown.
pub fn validate_with<A, V, C>(validator: V, on_invalid: C) -> Plugin<A>
where
    A: Value,
    V: Fn(&A) -> bool + Send + Sync + 'static,
    C: Fn(&A, &ReactiveError) + Send + Sync + 'static,
{
    let validator = Arc::new(validator);
    let on_invalid = Arc::new(on_invalid);
    Plugin::new("validate", move |input: &Container<A>| {
        let check = {
            let validator = Arc::clone(&validator);
            let on_invalid = Arc::clone(&on_invalid);
            move |value: &A| {
                let valid = validator(value);
                if !valid {
                    let error = ReactiveError::Validation("value rejected by validator".into());
                    on_invalid(value, &error);
                }
                valid
            }
        };

        check(&input.value());
        let output = Container::new(input.value());
        let target = output.clone();
        let upstream = input.subscribe(move |value| {
            if check(value) {
                target.set(value.clone());
            }
        });
        output.on_dispose(move || upstream.unsubscribe());
        output
    })
}

/// Log every value that reaches this point of the chain.
pub fn log<A>(label: impl Into<String>) -> Plugin<A>
where
    A: Value + Debug,
{
    let label: String = label.into();
    let label: Arc<str> = Arc::from(label);
    Plugin::new("log", move |input: &Container<A>| {
        let output = input.map(A::clone);
        let label = Arc::clone(&label);
        tracing::info!(label = %label, value = ?output.value(), "initial value");
        let _ = output.subscribe(move |value| {
            tracing::info!(label = %label, ?value, "value changed");
        });
        output
    })
}

/// Trailing-edge debounce.
pub fn debounce<A: Value>(wait: Duration) -> Plugin<A> {
    Plugin::new("debounce", move |input: &Container<A>| time::debounce(input, wait))
}

/// Leading-edge throttle.
pub fn throttle<A: Value>(window: Duration) -> Plugin<A> {
    Plugin::new("throttle", move |input: &Container<A>| time::throttle(input, window))
}

/// Seed from a fresh entry in `store` and write every value back stamped.
///
/// `ttl` defaults to the configured cache ttl.
pub fn cache<A>(store: Arc<dyn KeyValueStore>, key: impl Into<String>, ttl: Option<Duration>) -> Plugin<A>
where
    A: Value + Serialize + DeserializeOwned,
{
    let key: String = key.into();
    let key: Arc<str> = Arc::from(key);
    Plugin::new("cache", move |input: &Container<A>| {
        let ttl = ttl.unwrap_or_else(|| config::current().cache_ttl());
        let seed = net::load_fresh(store.as_ref(), &key, ttl).unwrap_or_else(|| input.value());
        let output = input.map(A::clone);
        output.set(seed);

        let store = Arc::clone(&store);
        let key = Arc::clone(&key);
        let _ = output.subscribe(move |value| {
            net::save_stamped(store.as_ref(), &key, value);
        });
        output
    })
}

/// Restore the last stored value, then save every change. No expiry.
pub fn persist<A>(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Plugin<A>
where
    A: Value + Serialize + DeserializeOwned,
{
    let key: String = key.into();
    let key: Arc<str> = Arc::from(key);
    Plugin::new("persist", move |input: &Container<A>| {
        let output = input.map(A::clone);
        if let Some(restored) = net::load::<A>(store.as_ref(), &key) {
            tracing::debug!(key = %key, "restored persisted value");
            output.set(restored);
        }

        let store = Arc::clone(&store);
        let key = Arc::clone(&key);
        let _ = output.subscribe(move |value| {
            net::save(store.as_ref(), &key, value);
        });
        output
    })
}

/// Run `work` for the seed and for every value, keeping only the result of
/// the most recently started run. A run resolving to `None` writes nothing.
fn latest_wins<A, F, Fut>(name: &'static str, work: F) -> Plugin<A>
where
    A: Value,
    F: Fn(&A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<A>> + Send + 'static,
{
    let work = Arc::new(work);
    Plugin::new(name, move |input: &Container<A>| {
        let output = Container::new(input.value());
        let issued = Arc::new(AtomicU64::new(0));
        let tasks = Arc::new(TimerSet::default());

        let launch = {
            let output = output.clone();
            let tasks = Arc::clone(&tasks);
            let work = Arc::clone(&work);
            move |value: &A| {
                let run = issued.fetch_add(1, Ordering::SeqCst) + 1;
                let pending = work(value);
                let output = output.clone();
                let issued = Arc::clone(&issued);
                tasks.track(schedule::spawn(async move {
                    let Some(next) = pending.await else {
                        return;
                    };
                    if issued.load(Ordering::SeqCst) == run {
                        output.set(next);
                    } else {
                        tracing::trace!(plugin = name, run, "discarding superseded result");
                    }
                }));
            }
        };

        launch(&input.value());
        let upstream = input.subscribe(launch);
        output.on_dispose(move || {
            upstream.unsubscribe();
            tasks.cancel_all();
        });
        output
    })
}

/// Replace each value with the result of an async computation on it.
pub fn async_map<A, F, Fut>(f: F) -> Plugin<A>
where
    A: Value,
    F: Fn(&A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = A> + Send + 'static,
{
    latest_wins("async", move |value: &A| f(value).map(Some))
}

/// Like [`async_map`] for fallible requests. Failures are logged and the
/// previous value stays.
pub fn fetch_with<A, F, Fut, E>(f: F) -> Plugin<A>
where
    A: Value,
    F: Fn(&A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    latest_wins("fetch", move |value: &A| {
        f(value).map(|outcome| match outcome {
            Ok(next) => Some(next),
            Err(error) => {
                tracing::warn!(%error, "fetch plugin request failed");
                None
            }
        })
    })
}

/// Treat each incoming value as an action folded into the output by `step`.
pub fn reducer<A, R>(step: R) -> Plugin<A>
where
    A: Value,
    R: Fn(&A, &A) -> A + Send + Sync + 'static,
{
    let step = Arc::new(step);
    Plugin::new("reducer", move |input: &Container<A>| {
        let output = Container::new(input.value());
        let target = output.clone();
        let step = Arc::clone(&step);
        let upstream = input.subscribe(move |action| {
            target.update(|state| step(state, action));
        });
        output.on_dispose(move || upstream.unsubscribe());
        output
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryStore;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    #[test]
    fn filter_keeps_last_accepted_value() {
        let base = Container::new(2);
        let evens = filter(|v: &i32| v % 2 == 0).apply(&base);

        base.set(3);
        assert_eq!(evens.value(), 2);
        base.set(8);
        assert_eq!(evens.value(), 8);
    }

    #[test]
    fn validation_failures_go_to_callback() {
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let rejected_clone = rejected.clone();
        let base = Container::new(String::from("ok"));
        let field = validate_with(
            |v: &String| !v.is_empty(),
            move |v: &String, err: &ReactiveError| {
                assert!(matches!(err, ReactiveError::Validation(_)));
                rejected_clone.lock().push(v.clone());
            },
        )
        .apply(&base);

        base.set(String::new());
        assert_eq!(field.value(), "ok");
        assert_eq!(rejected.lock().len(), 1);

        base.set("fine".into());
        assert_eq!(field.value(), "fine");
    }

    #[test]
    fn log_passes_values_through() {
        let base = Container::new(1);
        let logged = log("counter").apply(&base);
        base.set(9);
        assert_eq!(logged.value(), 9);
    }

    #[test]
    fn persist_restores_across_containers() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first = Container::new(0);
        let _saved = persist(store.clone(), "count").apply(&first);
        first.set(5);

        let second = Container::new(0);
        let restored = persist(store.clone(), "count").apply(&second);
        assert_eq!(restored.value(), 5);
        assert_eq!(store.get("count").unwrap().as_deref(), Some("5"));
    }

    #[test]
    fn cache_seeds_from_fresh_entry() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        net::save_stamped(store.as_ref(), "theme", &"dark".to_string());

        let base = Container::new("light".to_string());
        let themed = cache(store.clone(), "theme", Some(Duration::from_secs(60))).apply(&base);
        assert_eq!(themed.value(), "dark");

        base.set("solarized".into());
        let stored: net::Stamped<String> =
            serde_json::from_str(&store.get("theme").unwrap().unwrap()).unwrap();
        assert_eq!(stored.data, "solarized");
    }

    #[test]
    fn reducer_accumulates_actions() {
        let deltas = Container::new(0);
        let total = reducer(|sum: &i32, delta: &i32| sum + delta).apply(&deltas);

        deltas.set(5);
        deltas.set(3);
        assert_eq!(total.value(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn async_map_keeps_latest_result() {
        let base = Container::new(1);
        let slow_for_small = async_map(|v: &i32| {
            let v = *v;
            async move {
                let wait = if v < 5 { 100 } else { 10 };
                sleep(Duration::from_millis(wait)).await;
                v * 10
            }
        })
        .apply(&base);

        base.set(7);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(slow_for_small.value(), 70);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_with_drops_failures() {
        let base = Container::new(1);
        let fetched = fetch_with(|v: &i32| {
            let v = *v;
            async move {
                if v > 0 {
                    Ok(v + 100)
                } else {
                    Err("negative id")
                }
            }
        })
        .apply(&base);

        sleep(Duration::from_millis(1)).await;
        assert_eq!(fetched.value(), 101);

        base.set(-1);
        sleep(Duration::from_millis(1)).await;
        assert_eq!(fetched.value(), 101);
    }
}
