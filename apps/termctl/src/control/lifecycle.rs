use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::router::{EventRouter, event_sink};
use super::{ControlCore, ControlError, ControlShared, FontState};
use crate::auto_scroll::AutoScrollSettings;
use crate::config::ControlSettings;
use crate::engine::TerminalEngine;
use crate::host::FontSizeChange;
use crate::input::InputTranslator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Uninitialized,
    Initialized,
    Closing,
    Closed,
}

/// Set once when teardown starts. Every deferred callback checks it before
/// touching the control.
#[derive(Clone, Debug, Default)]
pub struct ClosingFlag(Arc<AtomicBool>);

impl ClosingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true for the call that actually set the flag.
    pub fn set(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub(super) struct Lifecycle {
    state: Mutex<ControlState>,
    closing: ClosingFlag,
}

impl Lifecycle {
    pub(super) fn new() -> Self {
        Self {
            state: Mutex::new(ControlState::Uninitialized),
            closing: ClosingFlag::new(),
        }
    }

    pub(super) fn state(&self) -> ControlState {
        *self.state.lock()
    }

    pub(super) fn is_closing(&self) -> bool {
        self.closing.is_set()
    }

    pub(super) fn closing_flag(&self) -> ClosingFlag {
        self.closing.clone()
    }

    pub(super) fn ensure_initialized(&self) -> Result<(), ControlError> {
        match self.state() {
            ControlState::Initialized if !self.is_closing() => Ok(()),
            ControlState::Uninitialized => Err(ControlError::NotInitialized),
            _ => Err(ControlError::Closed),
        }
    }

    fn ensure_uninitialized(&self) -> Result<(), ControlError> {
        match self.state() {
            ControlState::Uninitialized if !self.is_closing() => Ok(()),
            ControlState::Initialized => Err(ControlError::AlreadyInitialized),
            _ => Err(ControlError::Closed),
        }
    }

    fn mark_initialized(&self) -> Result<(), ControlError> {
        let mut state = self.state.lock();
        if self.closing.is_set() {
            return Err(ControlError::Closed);
        }
        *state = ControlState::Initialized;
        Ok(())
    }

    /// Returns false when teardown already started.
    fn begin_close(&self) -> bool {
        let mut state = self.state.lock();
        if !self.closing.set() {
            return false;
        }
        *state = ControlState::Closing;
        true
    }

    fn finish_close(&self) {
        *self.state.lock() = ControlState::Closed;
    }
}

impl ControlCore {
    /// Validates settings, creates the render surface, applies the font and
    /// subscribes to the engine. On error nothing stays registered and the
    /// control remains uninitialized.
    pub fn initialize(
        &self,
        settings: ControlSettings,
        mut engine: Box<dyn TerminalEngine>,
    ) -> Result<(), ControlError> {
        let shared = &self.shared;
        shared.lifecycle.ensure_uninitialized()?;
        settings.validate()?;
        let translator = InputTranslator::from_settings(&settings)?;

        let mut surface = shared
            .surface_factory
            .create(&settings)
            .map_err(ControlError::SurfaceCreation)?;
        let cell = surface
            .set_font_size(settings.font_size)
            .map_err(ControlError::SurfaceCreation)?;

        shared.apply_intervals(&settings);
        shared.blink.set_interval(settings.cursor_blink_interval());
        shared
            .auto_scroll
            .set_settings(AutoScrollSettings::from_settings(&settings));
        *shared.font.lock() = FontState {
            size: settings.font_size,
            cell,
        };
        *shared.translator.write() = translator;
        let font_size = settings.font_size;
        let cursor_blink = settings.cursor_blink;
        *shared.settings.write() = Arc::new(settings);
        *shared.surface.lock() = Some(surface);

        register_deliveries(shared);
        *shared.router.write() = EventRouter::standard();

        let scroll = engine.scroll_state();
        shared.scrollbar.set_state(scroll);
        engine.subscribe(event_sink(shared));
        *shared.engine.lock() = Some(engine);

        if let Err(err) = shared.lifecycle.mark_initialized() {
            // Closed from another thread while we were wiring up.
            self.teardown();
            return Err(err);
        }
        info!(target = "control::lifecycle", font_size, "control initialized");

        shared.host.on_font_size_changed(FontSizeChange {
            width: cell.width.round() as u32,
            height: cell.height.round() as u32,
            is_initial: true,
        });
        shared.host.on_initialized();
        shared.blink.set_blink_enabled(cursor_blink);
        shared.scrollbar.engine_changed(scroll);
        shared.redraw.submit(());
        Ok(())
    }

    /// Tears the control down. Idempotent; safe to call in any state.
    pub fn close(&self) {
        if !self.shared.lifecycle.begin_close() {
            return;
        }
        self.teardown();
        self.shared.lifecycle.finish_close();
        info!(target = "control::lifecycle", "control closed");
    }

    fn teardown(&self) {
        let shared = &self.shared;
        shared.auto_scroll.cancel();
        shared.blink.stop();
        shared.redraw.stop();
        shared.cursor_moved.stop();
        shared.title.stop();
        shared.output_activity.stop();
        shared.scrollbar.throttle().stop();
        shared.router.write().clear();

        let engine = shared.engine.lock().take();
        if let Some(mut engine) = engine {
            engine.unsubscribe();
            engine.shutdown();
            debug!(target = "control::lifecycle", "engine released");
        }
        let surface = shared.surface.lock().take();
        if surface.is_some() {
            debug!(target = "control::lifecycle", "render surface released");
        }
    }
}

/// Wires each throttle to its consumer. Callbacks hold the control weakly.
fn register_deliveries(shared: &Arc<ControlShared>) {
    let me = Arc::downgrade(shared);
    shared.redraw.set_callback(move |()| {
        let Some(shared) = live(&me) else {
            return;
        };
        shared.with_surface(|surface| surface.invalidate());
    });

    let me = Arc::downgrade(shared);
    shared.cursor_moved.set_callback(move |()| {
        if let Some(shared) = live(&me) {
            shared.blink.reset();
        }
    });

    let me = Arc::downgrade(shared);
    shared.title.set_callback(move |title: String| {
        if let Some(shared) = live(&me) {
            shared.host.on_title_changed(&title);
        }
    });

    let me = Arc::downgrade(shared);
    shared.output_activity.set_callback(move |chunks: u64| {
        if let Some(shared) = live(&me) {
            shared.host.on_output_activity(chunks);
        }
    });

    let me = Arc::downgrade(shared);
    shared.scrollbar.throttle().set_callback(move |state| {
        let Some(shared) = live(&me) else {
            return;
        };
        let host = Arc::clone(&shared.host);
        shared
            .scrollbar
            .apply_engine_update(state, |update| host.on_scrollbar_update(update));
    });
}

fn live(me: &Weak<ControlShared>) -> Option<Arc<ControlShared>> {
    let shared = me.upgrade()?;
    if shared.is_closing() {
        trace!(target = "control::lifecycle", "delivery after close dropped");
        return None;
    }
    Some(shared)
}
