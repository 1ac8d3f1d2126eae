use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::ControlShared;
use crate::engine::{EngineEvent, EngineEventKind, EngineEventSink};
use crate::host::FontSizeChange;

/// Runs on the engine's thread. Must only hand work off: submit to a
/// throttle, store a value, or post to the delivery context.
pub type EventHandler = fn(&ControlShared, EngineEvent);

/// Explicit table from engine event kind to handler.
#[derive(Clone, Debug, Default)]
pub struct EventRouter {
    handlers: HashMap<EngineEventKind, EventHandler>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes every event kind the control understands.
    pub fn standard() -> Self {
        let mut router = Self::new();
        router.register(EngineEventKind::OutputReceived, output_received);
        router.register(EngineEventKind::RenderNeeded, render_needed);
        router.register(EngineEventKind::ScrollPositionChanged, scroll_position_changed);
        router.register(EngineEventKind::FontSizeChanged, font_size_changed);
        router.register(EngineEventKind::TitleChanged, title_changed);
        router.register(EngineEventKind::TaskbarProgressChanged, taskbar_progress_changed);
        router.register(EngineEventKind::ConnectionStateChanged, connection_state_changed);
        router.register(EngineEventKind::WarningBell, warning_bell);
        router.register(EngineEventKind::TabColorChanged, tab_color_changed);
        router.register(EngineEventKind::CursorPositionChanged, cursor_position_changed);
        router
    }

    /// Replaces any handler already registered for `kind`.
    pub fn register(&mut self, kind: EngineEventKind, handler: EventHandler) {
        self.handlers.insert(kind, handler);
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    pub fn handler(&self, kind: EngineEventKind) -> Option<EventHandler> {
        self.handlers.get(&kind).copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Sink handed to the engine. Holds the control weakly; events arriving
/// after close are dropped.
pub(super) fn event_sink(shared: &Arc<ControlShared>) -> EngineEventSink {
    let me = Arc::downgrade(shared);
    EngineEventSink::new(move |event| {
        let Some(shared) = me.upgrade() else {
            return;
        };
        if shared.is_closing() {
            trace!(target = "control::router", kind = ?event.kind(), "event after close dropped");
            return;
        }
        let handler = shared.router.read().handler(event.kind());
        match handler {
            Some(handler) => handler(&shared, event),
            None => trace!(target = "control::router", kind = ?event.kind(), "unrouted event"),
        }
    })
}

fn output_received(shared: &ControlShared, _event: EngineEvent) {
    shared.output_activity.submit(1);
}

fn render_needed(shared: &ControlShared, _event: EngineEvent) {
    shared.redraw.submit(());
}

fn scroll_position_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::ScrollPositionChanged(state) = event {
        shared.scrollbar.engine_changed(state);
        shared.redraw.submit(());
    }
}

fn font_size_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::FontSizeChanged { width, height } = event {
        shared.post(move |shared| {
            shared.host.on_font_size_changed(FontSizeChange {
                width,
                height,
                is_initial: false,
            });
        });
    }
}

fn title_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::TitleChanged(title) = event {
        shared.status.lock().title = title.clone();
        shared.title.submit(title);
    }
}

fn taskbar_progress_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::TaskbarProgressChanged(progress) = event {
        shared.status.lock().taskbar = progress;
        shared.post(move |shared| shared.host.on_taskbar_progress(progress));
    }
}

fn connection_state_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::ConnectionStateChanged(state) = event {
        shared.status.lock().connection = state;
        shared.post(move |shared| shared.host.on_connection_state(state));
    }
}

fn warning_bell(shared: &ControlShared, _event: EngineEvent) {
    shared.post(|shared| shared.host.on_warning_bell());
}

fn tab_color_changed(shared: &ControlShared, event: EngineEvent) {
    if let EngineEvent::TabColorChanged(color) = event {
        shared.status.lock().tab_color = color;
        shared.post(move |shared| shared.host.on_tab_color_changed(color));
    }
}

fn cursor_position_changed(shared: &ControlShared, _event: EngineEvent) {
    shared.cursor_moved.submit(());
}
