//! Rate limiting over plain containers.
//!
//! Shared by [`Time`](super::Time) and the plugin engine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::timer::{self, TimerSlot};
use crate::reactive::{Container, Value};

/// Trailing-edge debounce: deliver the last value after `wait` of silence.
pub fn debounce<A: Value>(source: &Container<A>, wait: Duration) -> Container<A> {
    let settled = Container::new(source.value());
    let pending = Arc::new(TimerSlot::default());

    let target = settled.clone();
    let slot = Arc::clone(&pending);
    let upstream = source.subscribe(move |value| {
        let target = target.clone();
        let value = value.clone();
        slot.replace(timer::after(wait, move || {
            target.set(value);
        }));
    });

    settled.on_dispose(move || {
        upstream.unsubscribe();
        pending.cancel();
    });
    settled
}

/// Leading-edge throttle: deliver a value only if `window` has passed since
/// the last delivered one. Values inside the window are dropped.
///
/// The seed value does not open a window; the first emission always passes.
pub fn throttle<A: Value>(source: &Container<A>, window: Duration) -> Container<A> {
    let gated = Container::new(source.value());
    let last: Mutex<Option<Instant>> = Mutex::new(None);

    let target = gated.clone();
    let upstream = source.subscribe(move |value| {
        let now = Instant::now();
        let open = {
            let mut last = last.lock();
            let open = last.map_or(true, |at| now.duration_since(at) >= window);
            if open {
                *last = Some(now);
            }
            open
        };

        if open {
            target.set(value.clone());
        } else {
            tracing::trace!(container = target.id(), "throttled value dropped");
        }
    });

    gated.on_dispose(move || upstream.unsubscribe());
    gated
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn debounce_delivers_only_the_last_value() {
        let source = Container::new(-1);
        let settled = debounce(&source, Duration::from_millis(50));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let _sub = settled.subscribe(move |v| seen_clone.lock().push(*v));

        for v in 0..3 {
            source.set(v);
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(settled.value(), -1);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_debounce_drops_pending_value() {
        let source = Container::new(0);
        let settled = debounce(&source, Duration::from_millis(20));

        source.set(1);
        settled.dispose();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(settled.value(), 0);
        assert_eq!(source.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_drops_values_inside_window() {
        let source = Container::new(0);
        let gated = throttle(&source, Duration::from_millis(100));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let _sub = gated.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        source.set(1);
        source.set(2);
        sleep(Duration::from_millis(50)).await;
        source.set(3);
        assert_eq!(gated.value(), 1);

        sleep(Duration::from_millis(60)).await;
        source.set(4);
        assert_eq!(gated.value(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
