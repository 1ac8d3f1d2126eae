use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::dispatch::Dispatcher;
use crate::timer::TimerController;

pub const DEFAULT_BLINK_INTERVAL: Duration = Duration::from_millis(530);

type VisibilityCallback = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorBlinkState {
    /// Control not focused.
    Off,
    /// Focused, but blinking is disabled or the control is read-only.
    VisibleSolid,
    Blinking { visible: bool },
}

impl CursorBlinkState {
    pub fn is_visible(self) -> bool {
        match self {
            CursorBlinkState::Off | CursorBlinkState::VisibleSolid => true,
            CursorBlinkState::Blinking { visible } => visible,
        }
    }
}

struct BlinkInner {
    state: CursorBlinkState,
    focused: bool,
    blink_enabled: bool,
    read_only: bool,
    interval: Duration,
}

/// Drives cursor visibility toggling.
///
/// Every transition other than a timer tick is a forced reset: the timer is
/// stopped, the cursor becomes visible and the callback fires even when the
/// cursor was already visible. Ticks only notify when the value flips.
pub struct BlinkController {
    inner: Arc<Mutex<BlinkInner>>,
    timer: TimerController,
    notify: VisibilityCallback,
}

impl BlinkController {
    pub fn new<F>(dispatcher: Dispatcher, blink_enabled: bool, interval: Duration, notify: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(BlinkInner {
                state: CursorBlinkState::Off,
                focused: false,
                blink_enabled,
                read_only: false,
                interval,
            })),
            timer: TimerController::new("cursor-blink", dispatcher),
            notify: Arc::new(notify),
        }
    }

    pub fn state(&self) -> CursorBlinkState {
        self.inner.lock().state
    }

    pub fn is_visible(&self) -> bool {
        self.state().is_visible()
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer.is_running()
    }

    pub fn focus_gained(&self) {
        self.inner.lock().focused = true;
        self.reevaluate("focus gained");
    }

    pub fn focus_lost(&self) {
        self.inner.lock().focused = false;
        self.reevaluate("focus lost");
    }

    pub fn set_blink_enabled(&self, enabled: bool) {
        self.inner.lock().blink_enabled = enabled;
        self.reevaluate("blink setting changed");
    }

    /// Takes effect from the next reset.
    pub fn set_interval(&self, interval: Duration) {
        self.inner.lock().interval = interval;
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.inner.lock().read_only = read_only;
        self.reevaluate("read-only toggled");
    }

    /// Restarts the blink cycle from visible. Called on every interaction.
    pub fn reset(&self) {
        self.reevaluate("interaction");
    }

    /// Stops blinking without notifying. Used while the control shuts down.
    pub fn stop(&self) {
        self.timer.stop();
        let mut inner = self.inner.lock();
        inner.focused = false;
        inner.state = CursorBlinkState::Off;
    }

    fn reevaluate(&self, reason: &'static str) {
        self.timer.stop();
        let (next, interval) = {
            let mut inner = self.inner.lock();
            let next = if !inner.focused {
                CursorBlinkState::Off
            } else if !inner.blink_enabled || inner.read_only {
                CursorBlinkState::VisibleSolid
            } else {
                CursorBlinkState::Blinking { visible: true }
            };
            inner.state = next;
            (next, inner.interval)
        };
        debug!(target = "blink", reason, state = ?next, "cursor blink reset");
        (self.notify)(true);

        if matches!(next, CursorBlinkState::Blinking { .. }) {
            let inner = Arc::clone(&self.inner);
            let notify = Arc::clone(&self.notify);
            self.timer
                .start(interval, true, move || Self::tick(&inner, &notify));
        }
    }

    fn tick(inner: &Mutex<BlinkInner>, notify: &VisibilityCallback) {
        let flipped = {
            let mut inner = inner.lock();
            match inner.state {
                CursorBlinkState::Blinking { visible } => {
                    inner.state = CursorBlinkState::Blinking { visible: !visible };
                    Some(!visible)
                }
                _ => None,
            }
        };
        if let Some(visible) = flipped {
            trace!(target = "blink", visible, "blink tick");
            notify(visible);
        }
    }
}
