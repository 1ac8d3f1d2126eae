use std::fmt;
use std::ops::AddAssign;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dispatch::Dispatcher;

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(16);

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;
type MergeFn<T> = Arc<dyn Fn(T, T) -> T + Send + Sync>;

/// How a newly submitted value combines with a value that has not been
/// delivered yet.
pub enum MergeRule<T> {
    /// The newest value wins.
    Replace,
    /// `merge(pending, incoming)`.
    Custom(MergeFn<T>),
}

impl<T> MergeRule<T> {
    pub fn custom<F>(merge: F) -> Self
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        MergeRule::Custom(Arc::new(merge))
    }

    fn apply(&self, pending: T, incoming: T) -> T {
        match self {
            MergeRule::Replace => incoming,
            MergeRule::Custom(merge) => merge(pending, incoming),
        }
    }
}

impl<T: AddAssign + Send + 'static> MergeRule<T> {
    /// Sums deltas.
    pub fn accumulate() -> Self {
        MergeRule::custom(|mut pending: T, incoming: T| {
            pending += incoming;
            pending
        })
    }
}

impl<T> fmt::Debug for MergeRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeRule::Replace => f.write_str("Replace"),
            MergeRule::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Length of one scheduling window.
    pub interval: Duration,
    /// Deliver the first value of an idle window immediately instead of at
    /// the end of the window.
    pub leading: bool,
}

impl ThrottleConfig {
    pub fn trailing(interval: Duration) -> Self {
        Self {
            interval,
            leading: false,
        }
    }

    pub fn leading(interval: Duration) -> Self {
        Self {
            interval,
            leading: true,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::trailing(DEFAULT_THROTTLE_INTERVAL)
    }
}

struct Slot<T> {
    pending: Option<T>,
    scheduled: bool,
    merged: u32,
}

struct ThrottleInner<T> {
    name: &'static str,
    config: Mutex<ThrottleConfig>,
    merge: MergeRule<T>,
    dispatcher: Dispatcher,
    slot: Mutex<Slot<T>>,
    callback: Mutex<Option<Callback<T>>>,
    stopped: AtomicBool,
}

/// Coalesces bursts of submissions into at most one delivery per window.
///
/// `submit` is safe to call from any thread and only holds a short lock while
/// merging into the single pending slot. Deliveries are spawned on the
/// [`Dispatcher`]; only one delivery task exists per throttle at a time, so
/// the consumer is never invoked concurrently with itself and never sees a
/// value older than one it already received.
pub struct UpdateThrottle<T: Send + 'static> {
    inner: Arc<ThrottleInner<T>>,
}

impl<T: Send + 'static> Clone for UpdateThrottle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> UpdateThrottle<T> {
    pub fn new(
        name: &'static str,
        dispatcher: Dispatcher,
        config: ThrottleConfig,
        merge: MergeRule<T>,
    ) -> Self {
        Self {
            inner: Arc::new(ThrottleInner {
                name,
                config: Mutex::new(config),
                merge,
                dispatcher,
                slot: Mutex::new(Slot {
                    pending: None,
                    scheduled: false,
                    merged: 0,
                }),
                callback: Mutex::new(None),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Replace-with-latest throttle.
    pub fn latest(name: &'static str, dispatcher: Dispatcher, config: ThrottleConfig) -> Self {
        Self::new(name, dispatcher, config, MergeRule::Replace)
    }

    /// Sum-of-deltas throttle.
    pub fn accumulating(name: &'static str, dispatcher: Dispatcher, config: ThrottleConfig) -> Self
    where
        T: AddAssign,
    {
        Self::new(name, dispatcher, config, MergeRule::accumulate())
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn config(&self) -> ThrottleConfig {
        *self.inner.config.lock()
    }

    /// Applies from the next window on.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.config.lock().interval = interval;
    }

    /// Registers the single consumer. Replaces any previous consumer.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        *self.inner.callback.lock() = Some(Arc::new(callback));
        // A value may have been parked while no consumer was registered.
        let needs_schedule = {
            let mut slot = self.inner.slot.lock();
            if slot.pending.is_some() && !slot.scheduled && !self.is_stopped() {
                slot.scheduled = true;
                true
            } else {
                false
            }
        };
        if needs_schedule {
            ThrottleInner::schedule(&self.inner);
        }
    }

    /// Merges `value` into the pending slot and schedules a delivery if none
    /// is scheduled yet. Never blocks on the consumer.
    pub fn submit(&self, value: T) {
        if self.is_stopped() {
            trace!(target = "throttle", name = self.inner.name, "submit after stop discarded");
            return;
        }
        let needs_schedule = {
            let mut slot = self.inner.slot.lock();
            let merged = match slot.pending.take() {
                Some(pending) => {
                    slot.merged = slot.merged.saturating_add(1);
                    self.inner.merge.apply(pending, value)
                }
                None => value,
            };
            slot.pending = Some(merged);
            if slot.scheduled {
                false
            } else {
                slot.scheduled = true;
                true
            }
        };
        if needs_schedule {
            ThrottleInner::schedule(&self.inner);
        }
    }

    /// Stops the throttle for good: the pending value is dropped and any later
    /// submission is discarded.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.slot.lock().pending = None;
        self.inner.callback.lock().take();
        debug!(target = "throttle", name = self.inner.name, "throttle stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn has_pending(&self) -> bool {
        self.inner.slot.lock().pending.is_some()
    }
}

impl<T: Send + 'static> ThrottleInner<T> {
    fn schedule(inner: &Arc<Self>) {
        let task = Arc::clone(inner);
        let _ = inner.dispatcher.spawn(async move { task.run().await });
    }

    async fn run(self: Arc<Self>) {
        let config = *self.config.lock();
        if !config.leading {
            tokio::time::sleep(config.interval).await;
        }
        loop {
            let Some((value, merged)) = self.take_for_delivery() else {
                return;
            };
            let Some(callback) = self.callback.lock().clone() else {
                // No consumer yet: park the value until `set_callback`.
                let mut slot = self.slot.lock();
                slot.scheduled = false;
                if self.stopped.load(Ordering::Acquire) {
                    return;
                }
                slot.pending = Some(match slot.pending.take() {
                    Some(newer) => self.merge.apply(value, newer),
                    None => value,
                });
                return;
            };
            trace!(
                target = "throttle",
                name = self.name,
                coalesced = merged,
                "delivering"
            );
            callback(value);
            let interval = self.config.lock().interval;
            tokio::time::sleep(interval).await;
        }
    }

    fn take_for_delivery(&self) -> Option<(T, u32)> {
        let mut slot = self.slot.lock();
        if self.stopped.load(Ordering::Acquire) {
            slot.pending = None;
            slot.scheduled = false;
            return None;
        }
        match slot.pending.take() {
            Some(value) => {
                let merged = std::mem::take(&mut slot.merged);
                Some((value, merged))
            }
            None => {
                slot.scheduled = false;
                None
            }
        }
    }
}
