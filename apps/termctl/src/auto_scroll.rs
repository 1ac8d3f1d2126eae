use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ControlSettings;
use crate::dispatch::Dispatcher;
use crate::input::PointerPosition;
use crate::timer::TimerController;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AutoScrollSettings {
    pub velocity_scale: f64,
    /// Rows per second.
    pub max_velocity: f64,
    pub tick_interval: Duration,
}

impl AutoScrollSettings {
    pub fn from_settings(settings: &ControlSettings) -> Self {
        Self {
            velocity_scale: settings.scroll_velocity_scale,
            max_velocity: settings.max_auto_scroll_velocity,
            tick_interval: settings.auto_scroll_interval(),
        }
    }
}

impl Default for AutoScrollSettings {
    fn default() -> Self {
        Self::from_settings(&ControlSettings::default())
    }
}

/// Vertical extent of the viewport in surface pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportBounds {
    pub top: f64,
    pub bottom: f64,
}

impl ViewportBounds {
    pub const fn new(top: f64, bottom: f64) -> Self {
        Self { top, bottom }
    }

    /// Signed distance past the nearest edge; zero inside.
    pub fn overshoot(&self, y: f64) -> f64 {
        if y < self.top {
            y - self.top
        } else if y > self.bottom {
            y - self.bottom
        } else {
            0.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollBounds {
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

/// What auto-scroll drives. Called on the delivery context.
pub trait AutoScrollHost: Send + Sync {
    fn scroll_bounds(&self) -> Option<ScrollBounds>;
    /// Scroll to `view_top` and extend the selection to `pointer`.
    fn apply_auto_scroll(&self, view_top: i32, pointer: PointerPosition);
}

/// Rows per second for a pointer `distance` pixels past the viewport edge:
/// `(d²/25 + 2) · scale`, clamped to `max`. Negative above the viewport.
pub fn velocity_for_distance(distance: f64, scale: f64, max: f64) -> f64 {
    if distance == 0.0 || !distance.is_finite() {
        return 0.0;
    }
    let d = distance.abs();
    let speed = ((d * d / 25.0 + 2.0) * scale).min(max);
    speed.copysign(distance)
}

#[derive(Clone, Copy, Debug)]
struct PointerDragState {
    pointer_id: u32,
    last_position: PointerPosition,
    velocity: f64,
    active: bool,
    last_tick: Instant,
    /// Fractional scroll position; seeded from the scroll bounds on the
    /// first tick.
    offset: Option<f64>,
}

struct AutoScrollInner {
    settings: AutoScrollSettings,
    drag: Option<PointerDragState>,
}

/// Scrolls the viewport while a selection drag sits outside it.
pub struct AutoScrollController {
    inner: Arc<Mutex<AutoScrollInner>>,
    timer: TimerController,
    host: Weak<dyn AutoScrollHost>,
}

impl AutoScrollController {
    pub fn new(
        dispatcher: Dispatcher,
        settings: AutoScrollSettings,
        host: Weak<dyn AutoScrollHost>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AutoScrollInner {
                settings,
                drag: None,
            })),
            timer: TimerController::new("auto-scroll", dispatcher),
            host,
        }
    }

    pub fn settings(&self) -> AutoScrollSettings {
        self.inner.lock().settings
    }

    /// Takes effect on the next drag update; a running timer keeps its
    /// interval until then.
    pub fn set_settings(&self, settings: AutoScrollSettings) {
        self.inner.lock().settings = settings;
    }

    pub fn is_active(&self) -> bool {
        self.inner
            .lock()
            .drag
            .is_some_and(|drag| drag.active)
    }

    pub fn velocity(&self) -> f64 {
        self.inner
            .lock()
            .drag
            .filter(|drag| drag.active)
            .map_or(0.0, |drag| drag.velocity)
    }

    /// Feeds a drag position. Returns whether auto-scroll is active
    /// afterwards. Positions from a pointer other than the one driving an
    /// active drag are ignored.
    pub fn update_drag(
        &self,
        pointer_id: u32,
        position: PointerPosition,
        bounds: ViewportBounds,
    ) -> bool {
        let distance = bounds.overshoot(position.y);
        let start_interval = {
            let mut inner = self.inner.lock();
            if let Some(drag) = inner.drag.filter(|drag| drag.active) {
                if drag.pointer_id != pointer_id {
                    trace!(
                        target = "auto_scroll",
                        pointer_id,
                        owner = drag.pointer_id,
                        "ignoring other pointer"
                    );
                    return true;
                }
            }
            if distance == 0.0 {
                let was_active = inner.drag.take().is_some_and(|drag| drag.active);
                drop(inner);
                if was_active {
                    self.timer.stop();
                    debug!(target = "auto_scroll", pointer_id, "pointer back inside viewport");
                }
                return false;
            }
            let settings = inner.settings;
            let velocity =
                velocity_for_distance(distance, settings.velocity_scale, settings.max_velocity);
            match inner
                .drag
                .as_mut()
                .filter(|drag| drag.active && drag.pointer_id == pointer_id)
            {
                Some(drag) => {
                    drag.velocity = velocity;
                    drag.last_position = position;
                    None
                }
                None => {
                    inner.drag = Some(PointerDragState {
                        pointer_id,
                        last_position: position,
                        velocity,
                        active: true,
                        last_tick: Instant::now(),
                        offset: None,
                    });
                    Some(settings.tick_interval)
                }
            }
        };

        if let Some(interval) = start_interval {
            debug!(target = "auto_scroll", pointer_id, distance, "auto-scroll started");
            let inner = Arc::clone(&self.inner);
            let host = self.host.clone();
            self.timer
                .start(interval, true, move || Self::tick(&inner, &host));
        }
        true
    }

    /// Pointer released or selection ended for `pointer_id`.
    pub fn stop(&self, pointer_id: u32) {
        let stopped = {
            let mut inner = self.inner.lock();
            match inner.drag {
                Some(drag) if drag.pointer_id == pointer_id => {
                    inner.drag = None;
                    true
                }
                _ => false,
            }
        };
        if stopped {
            self.timer.stop();
            debug!(target = "auto_scroll", pointer_id, "auto-scroll stopped");
        }
    }

    /// Deactivates regardless of pointer. Used on capture loss and close.
    pub fn cancel(&self) {
        self.inner.lock().drag = None;
        self.timer.stop();
    }

    fn tick(inner: &Mutex<AutoScrollInner>, host: &Weak<dyn AutoScrollHost>) {
        let Some(host) = host.upgrade() else {
            return;
        };
        let Some(bounds) = host.scroll_bounds() else {
            return;
        };
        let step = {
            let mut inner = inner.lock();
            let Some(drag) = inner.drag.as_mut().filter(|drag| drag.active) else {
                // Released between the fire and this tick.
                return;
            };
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(drag.last_tick).as_secs_f64();
            drag.last_tick = now;
            let offset = drag.offset.unwrap_or(f64::from(bounds.value)) + drag.velocity * elapsed;
            let offset = offset.clamp(f64::from(bounds.min), f64::from(bounds.max));
            drag.offset = Some(offset);
            let view_top = offset.round() as i32;
            (view_top != bounds.value).then_some((view_top, drag.last_position))
        };
        if let Some((view_top, pointer)) = step {
            trace!(target = "auto_scroll", view_top, "auto-scroll step");
            host.apply_auto_scroll(view_top, pointer);
        }
    }
}
