use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::dispatch::Dispatcher;
use crate::throttle::{ThrottleConfig, UpdateThrottle};

/// Viewport position within the scrollback, in rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub view_top: i32,
    pub view_height: i32,
    pub buffer_height: i32,
}

impl ScrollState {
    pub const fn new(view_top: i32, view_height: i32, buffer_height: i32) -> Self {
        Self {
            view_top,
            view_height,
            buffer_height,
        }
    }

    pub fn minimum(&self) -> i32 {
        0
    }

    pub fn maximum(&self) -> i32 {
        (self.buffer_height - self.view_height).max(0)
    }

    /// Enforces `view_top + view_height <= buffer_height` and non-negative
    /// extents.
    pub fn clamped(self) -> Self {
        let view_height = self.view_height.max(0);
        let buffer_height = self.buffer_height.max(view_height);
        let state = Self {
            view_top: self.view_top,
            view_height,
            buffer_height,
        };
        Self {
            view_top: self.view_top.clamp(state.minimum(), state.maximum()),
            ..state
        }
    }

    pub fn with_view_top(self, view_top: i32) -> Self {
        Self { view_top, ..self }.clamped()
    }

    pub fn is_at_bottom(&self) -> bool {
        self.view_top >= self.maximum()
    }
}

/// What the host scrollbar widget should display.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollbarUpdate {
    pub value: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub viewport_size: f64,
}

impl From<ScrollState> for ScrollbarUpdate {
    fn from(state: ScrollState) -> Self {
        Self {
            value: state.view_top as f64,
            minimum: state.minimum() as f64,
            maximum: state.maximum() as f64,
            viewport_size: state.view_height as f64,
        }
    }
}

/// Mediates between engine-reported scroll positions and the host scrollbar.
///
/// Engine updates reach the host through a throttle and are applied under the
/// self-originated guard; a host value change observed while the guard is up
/// is the widget echoing our own update and must not scroll the engine again.
pub struct ScrollbarSync {
    state: Mutex<ScrollState>,
    internal_update: AtomicBool,
    throttle: UpdateThrottle<ScrollState>,
}

struct InternalUpdateGuard<'a> {
    flag: &'a AtomicBool,
    previous: bool,
}

impl<'a> InternalUpdateGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        let previous = flag.swap(true, Ordering::AcqRel);
        Self { flag, previous }
    }
}

impl Drop for InternalUpdateGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::Release);
    }
}

impl ScrollbarSync {
    pub fn new(dispatcher: Dispatcher, config: ThrottleConfig) -> Self {
        Self {
            state: Mutex::new(ScrollState::default()),
            internal_update: AtomicBool::new(false),
            throttle: UpdateThrottle::latest("scrollbar", dispatcher, config),
        }
    }

    pub fn throttle(&self) -> &UpdateThrottle<ScrollState> {
        &self.throttle
    }

    pub fn state(&self) -> ScrollState {
        *self.state.lock()
    }

    pub fn is_internal_update(&self) -> bool {
        self.internal_update.load(Ordering::Acquire)
    }

    /// Engine thread entry point.
    pub fn engine_changed(&self, state: ScrollState) {
        self.throttle.submit(state);
    }

    /// Runs on delivery: records the engine state and pushes it to the host
    /// with the self-originated guard raised.
    pub fn apply_engine_update<F>(&self, state: ScrollState, push: F)
    where
        F: FnOnce(ScrollbarUpdate),
    {
        let state = state.clamped();
        *self.state.lock() = state;
        let _guard = InternalUpdateGuard::raise(&self.internal_update);
        trace!(
            target = "scrollbar",
            view_top = state.view_top,
            maximum = state.maximum(),
            "pushing scrollbar update"
        );
        push(ScrollbarUpdate::from(state));
    }

    /// Host scrollbar moved. Returns the row the engine should scroll to, or
    /// `None` when the change is an echo of our own update or a no-op.
    pub fn host_value_changed(&self, value: f64) -> Option<i32> {
        if self.is_internal_update() {
            trace!(target = "scrollbar", value, "suppressed scrollbar echo");
            return None;
        }
        if !value.is_finite() {
            return None;
        }
        let mut state = self.state.lock();
        let next = state.with_view_top(value.round() as i32);
        if next.view_top == state.view_top {
            return None;
        }
        *state = next;
        Some(next.view_top)
    }

    /// Locally originated scroll (API call, wheel, auto-scroll). Returns the
    /// clamped row.
    pub fn set_view_top(&self, view_top: i32) -> i32 {
        let mut state = self.state.lock();
        *state = state.with_view_top(view_top);
        state.view_top
    }

    pub fn set_state(&self, state: ScrollState) {
        *self.state.lock() = state.clamped();
    }
}
