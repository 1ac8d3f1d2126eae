use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::dispatch::Dispatcher;

type TimerCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
}

struct TimerSlot {
    generation: u64,
    state: TimerState,
    task: Option<JoinHandle<()>>,
}

/// Cancellable, restartable one-shot or periodic timer whose callbacks run on
/// the delivery context.
///
/// Every `start` bumps a generation counter; a fire that belongs to an older
/// generation is dropped before its callback runs. That makes `stop` from
/// inside the callback safe and keeps a restart from double-firing.
pub struct TimerController {
    name: &'static str,
    dispatcher: Dispatcher,
    slot: Arc<Mutex<TimerSlot>>,
}

impl TimerController {
    pub fn new(name: &'static str, dispatcher: Dispatcher) -> Self {
        Self {
            name,
            dispatcher,
            slot: Arc::new(Mutex::new(TimerSlot {
                generation: 0,
                state: TimerState::Stopped,
                task: None,
            })),
        }
    }

    /// Starts the timer, replacing whatever was running before.
    pub fn start<F>(&self, interval: Duration, repeating: bool, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: TimerCallback = Arc::new(callback);
        let interval = interval.max(Duration::from_millis(1));
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        let generation = slot.generation;
        slot.state = TimerState::Running;
        let shared = Arc::clone(&self.slot);
        let name = self.name;
        slot.task = Some(self.dispatcher.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                {
                    let mut slot = shared.lock();
                    if slot.generation != generation {
                        trace!(target = "timer", name, "stale fire dropped");
                        return;
                    }
                    if !repeating {
                        slot.state = TimerState::Stopped;
                        slot.task = None;
                    }
                }
                callback();
                if !repeating {
                    return;
                }
            }
        }));
        trace!(
            target = "timer",
            name,
            interval_ms = interval.as_millis() as u64,
            repeating,
            "timer started"
        );
    }

    /// Stops the timer. Stopping a stopped timer is a no-op.
    pub fn stop(&self) {
        let mut slot = self.slot.lock();
        if slot.state == TimerState::Stopped && slot.task.is_none() {
            return;
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.state = TimerState::Stopped;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        trace!(target = "timer", name = self.name, "timer stopped");
    }

    pub fn is_running(&self) -> bool {
        self.slot.lock().state == TimerState::Running
    }

    pub fn state(&self) -> TimerState {
        self.slot.lock().state
    }
}

impl Drop for TimerController {
    fn drop(&mut self) {
        self.stop();
    }
}
