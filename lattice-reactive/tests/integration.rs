//! Integration Tests for the Reactive Engine
//!
//! These tests verify that containers, effects, time, state, fetch and
//! plugins work together correctly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lattice_reactive::net::{AsyncState, Fetch, KeyValueStore, MemoryStore};
use lattice_reactive::plugin::{self, common, Pipeline};
use lattice_reactive::reactive::{Container, Effect};
use lattice_reactive::state::{fsm, machine, Transition};
use lattice_reactive::time::Time;
use lattice_reactive::ReactiveError;

fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + Clone + 'static) {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    (calls, move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
    })
}

/// Test that `map(identity)` tracks its source at every point.
#[test]
fn functor_identity() {
    let c = Container::new(1);
    let same = c.map(|x| *x);

    for next in [2, 2, -4, 100] {
        c.set(next);
        assert_eq!(same.value(), c.value());
    }
}

/// Test that mapping a composition equals composing maps.
#[test]
fn functor_composition() {
    let f = |x: &i32| x + 3;
    let g = |x: &i32| x * 7;

    let c = Container::new(0);
    let fused = c.map(move |x| g(&f(x)));
    let chained = c.map(f).map(g);

    for next in [1, 5, -2] {
        c.set(next);
        assert_eq!(fused.value(), chained.value());
    }
}

/// Test the three monad laws on effects.
#[test]
fn monad_laws() {
    let f = |x: &i32| Effect::pure(x + 1);
    let g = |x: &i32| Effect::pure(x * 2);

    assert_eq!(Effect::pure(3).bind(f).value(), f(&3).value());

    let m = Effect::new(5);
    assert_eq!(m.bind(|a| Effect::pure(*a)).value(), m.value());

    let left = m.bind(f).bind(g);
    let right = m.bind(move |a| f(a).bind(g));
    m.set(9);
    assert_eq!(left.value(), right.value());
    assert_eq!(left.value(), 20);
}

/// Test that setting the same primitive twice notifies once.
#[test]
fn change_suppression() {
    let c = Container::new(0);
    let (calls, bump) = counter();
    let _sub = c.subscribe(move |_| bump());

    c.set(1);
    c.set(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test the basic map scenario.
#[test]
fn mapped_value_follows_base() {
    let base = Container::new(5);
    let doubled = base.map(|x| x * 2);
    base.set(10);
    assert_eq!(doubled.value(), 20);
}

/// Test that a diamond recomputes once per path.
#[test]
fn diamond_recomputes_per_path() {
    let root = Container::new(1);
    let left = root.map(|x| x + 1);
    let right = root.map(|x| x * 2);

    let bottom = Container::new(0);
    let (calls, bump) = counter();
    let _sub = bottom.subscribe(move |_| bump());

    let (l, r, b) = (left.clone(), right.clone(), bottom.clone());
    let _a = left.subscribe(move |lv| {
        b.set(lv + r.value());
    });
    let (l2, b2) = (l.clone(), bottom.clone());
    let _b = right.subscribe(move |rv| {
        b2.set(l2.value() + rv);
    });

    root.set(2);
    assert_eq!(bottom.value(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Test debounce: three fast values settle into one notification.
#[tokio::test(start_paused = true)]
async fn debounce_delivers_last_value_once() {
    let source = Time::new(-1);
    let settled = source.debounce(Duration::from_millis(50));

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let _sub = settled.subscribe(move |v| seen_clone.lock().push(*v));

    for v in 0..3 {
        source.set(v);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*seen.lock(), vec![2]);
}

/// Test that retry(2) makes exactly three attempts and ends in an error.
#[tokio::test(start_paused = true)]
async fn retry_terminates_with_error() {
    let (calls, bump) = counter();
    let original = Fetch::new(move || {
        bump();
        async { Err::<u32, _>("offline") }
    });
    let retried = original.retry(2);
    original.dispose();

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        retried.value(),
        AsyncState {
            data: None,
            loading: false,
            error: Some(ReactiveError::Network("offline".into())),
        }
    );
}

/// Test that an unknown FSM action changes nothing and notifies nobody.
#[test]
fn fsm_ignores_unknown_action() {
    let door = fsm("idle", vec![Transition::new("idle", "start", "loading")]);
    let (calls, bump) = counter();
    let _sub = door.subscribe(move |_| bump());

    door.send("bogus");
    assert_eq!(door.current(), "idle");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Test the reducer machine scenario.
#[test]
fn machine_moves_to_loading() {
    let m = machine("idle", |s: &&'static str, a: &&'static str| match (*s, *a) {
        ("idle", "start") => "loading",
        _ => *s,
    });
    m.send("start");
    assert_eq!(m.state(), "loading");
}

/// Test a fetch driven by a debounced search box.
#[tokio::test(start_paused = true)]
async fn fetch_follows_debounced_query() {
    let query = Time::new(String::new());
    let settled = query.debounce(Duration::from_millis(30));

    let (calls, bump) = counter();
    let latest = settled.clone();
    let results = Fetch::new(move || {
        bump();
        let q = latest.value();
        async move { Ok::<_, String>(format!("results for '{q}'")) }
    })
    .depends_on(settled.clone());

    for partial in ["r", "ru", "rus", "rust"] {
        query.set(partial.to_string());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(results.data().as_deref(), Some("results for 'rust'"));
}

/// Test that a cached fetch serves a second consumer without a request.
#[tokio::test(start_paused = true)]
async fn cache_is_shared_through_the_store() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let (calls, bump) = counter();
    let make = {
        let bump = bump.clone();
        move || {
            let bump = bump.clone();
            Fetch::new(move || {
                bump();
                async { Ok::<_, String>(vec![1, 2, 3]) }
            })
        }
    };

    let first = make().cache(store.clone(), "list", None);
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(first.data(), Some(vec![1, 2, 3]));

    let seed = make();
    seed.dispose();
    let second = seed.cache(store, "list", None);
    assert_eq!(second.data(), Some(vec![1, 2, 3]));

    tokio::time::sleep(Duration::from_millis(1)).await;
    // `first` rides on its source's request; `second` never asks.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test a timeout racing a delayed value.
#[tokio::test(start_paused = true)]
async fn timeout_races_delay() {
    let source = Time::new(0);
    let slow = source.delay(Duration::from_millis(200));
    let raced = slow.timeout(Duration::from_millis(50));

    source.set(1);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(raced.value(), Err(ReactiveError::Timeout { after_ms: 50 }));
    assert_eq!(slow.value(), 1);
}

/// Test a plugin pipeline feeding a state machine.
#[test]
fn pipeline_feeds_machine() {
    let clicks = Container::new(0);
    let valid = Pipeline::new()
        .with(plugin::filter(|n: &i32| *n >= 0))
        .with(plugin::transform(|n: &i32| (*n).min(10)))
        .apply(&clicks);

    let m = machine(0, |total: &i32, n: &i32| total + n);
    let sink = m.clone();
    let _sub = valid.subscribe(move |n| sink.send(*n));

    clicks.set(3);
    clicks.set(-5);
    clicks.set(50);
    assert_eq!(m.state(), 13);
}

/// Test that disposing the end of a chain frees its source.
#[test]
fn disposing_derived_chain_releases_source() {
    let root = Container::new(1);
    let chain = common::debug::<i32>("root").apply(&root);
    let tail = chain.map(|x| x + 1);
    assert_eq!(root.subscriber_count(), 1);

    tail.dispose();
    chain.dispose();
    assert_eq!(root.subscriber_count(), 0);
}
