//! Timer plumbing.
//!
//! All temporal operators schedule work on the ambient tokio runtime and
//! keep the resulting [`TimerHandle`] so the owning container can cancel it
//! on dispose. Outside a runtime nothing is scheduled and callers get `None`.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Cancellation token for a scheduled timer or task.
#[derive(Debug, Clone)]
pub struct TimerHandle(AbortHandle);

impl TimerHandle {
    /// Abort the timer. No-op if it already fired.
    pub fn cancel(&self) {
        self.0.abort();
    }

    /// Whether the task has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

/// Spawn `task` on the current runtime.
pub(crate) fn spawn<F>(task: F) -> Option<TimerHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => Some(TimerHandle(handle.spawn(task).abort_handle())),
        Err(_) => {
            tracing::warn!("no tokio runtime, scheduled work dropped");
            None
        }
    }
}

/// Run `f` once after `delay`.
pub(crate) fn after<F>(delay: Duration, f: F) -> Option<TimerHandle>
where
    F: FnOnce() + Send + 'static,
{
    spawn(async move {
        tokio::time::sleep(delay).await;
        f();
    })
}

/// Run `f` every `period`, first after one full period.
pub(crate) fn every<F>(period: Duration, f: F) -> Option<TimerHandle>
where
    F: Fn() + Send + 'static,
{
    // tokio rejects a zero period
    let period = period.max(Duration::from_millis(1));
    spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            f();
        }
    })
}

/// A growing set of independent timers owned by one container.
#[derive(Default)]
pub(crate) struct TimerSet(Mutex<Vec<TimerHandle>>);

impl TimerSet {
    pub(crate) fn track(&self, timer: Option<TimerHandle>) {
        if let Some(timer) = timer {
            let mut timers = self.0.lock();
            timers.retain(|t| !t.is_finished());
            timers.push(timer);
        }
    }

    pub(crate) fn cancel_all(&self) {
        for timer in self.0.lock().drain(..) {
            timer.cancel();
        }
    }
}

/// Holds at most one pending timer; scheduling a new one cancels the old.
#[derive(Default)]
pub(crate) struct TimerSlot(Mutex<Option<TimerHandle>>);

impl TimerSlot {
    pub(crate) fn replace(&self, timer: Option<TimerHandle>) {
        let previous = std::mem::replace(&mut *self.0.lock(), timer);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub(crate) fn cancel(&self) {
        self.replace(None);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.0.lock().is_some()
    }
}
