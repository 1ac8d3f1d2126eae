use std::sync::atomic::Ordering;

use crossterm::event::{KeyModifiers, MouseButton};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use super::{ControlCore, ControlShared, MULTI_CLICK_WINDOW};
use crate::engine::{CellPosition, SelectionMode, TerminalMode};
use crate::input::{
    KeyInput, KeyTranslation, LocalPointerAction, PointerContext, PointerEvent,
    PointerEventKind, PointerTranslation, ShortcutAction,
};

/// Click counting and drag tracking for local selection.
#[derive(Debug, Default)]
pub(super) struct PointerGesture {
    last_click: Option<(Instant, CellPosition, u8)>,
    dragging: Option<u32>,
    /// Single click anchor, applied once the pointer actually moves.
    pending_anchor: Option<CellPosition>,
}

impl ControlCore {
    /// Key press or release from the host. Returns true when the key was
    /// consumed, either by a binding or as terminal input.
    pub fn handle_key(&self, input: &KeyInput) -> bool {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        let translation = {
            let translator = shared.translator.read();
            shared.with_engine(|engine| translator.translate_key(input, &*engine))
        };
        match translation {
            Some(KeyTranslation::Binding(action)) => {
                trace!(target = "control::input", action = %action, "key binding");
                shared.blink.reset();
                shared.run_shortcut(action);
                true
            }
            Some(KeyTranslation::Sequence(bytes)) => {
                shared.blink.reset();
                shared.send_user_input(&bytes, "key");
                true
            }
            Some(KeyTranslation::Unhandled) | None => false,
        }
    }

    /// Composed text (IME output, dead keys already resolved).
    pub fn handle_character(&self, ch: char, modifiers: KeyModifiers) -> bool {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        let bytes = shared.translator.read().translate_char(ch, modifiers);
        shared.blink.reset();
        shared.send_user_input(&bytes, "char");
        true
    }

    /// Pointer press, release, move or wheel. Returns true when the event
    /// produced a report or a local action.
    pub fn handle_pointer(&self, event: &PointerEvent) -> bool {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        let cell = shared.viewport_cell(event.position);
        let context = shared.with_engine(|engine| PointerContext {
            cell,
            mouse: engine.mouse_modes(),
            application_cursor: engine.get_mode(TerminalMode::CursorKeysApplication),
        });
        let Some(context) = context else {
            return false;
        };
        // A drag that started as a local selection ends locally, even if the
        // engine turned mouse reporting on halfway through.
        if let Some(action) = shared.local_drag_action(event) {
            shared.pointer_action(event, action);
            return true;
        }
        let translation = shared.translator.read().translate_pointer(event, &context);
        match translation {
            PointerTranslation::Report(bytes) => {
                shared.send_bytes(&bytes, "mouse");
                true
            }
            PointerTranslation::Local(action) => {
                shared.pointer_action(event, action);
                true
            }
            PointerTranslation::Ignored => false,
        }
    }

    /// The host lost pointer capture; any drag in progress ends.
    pub fn pointer_capture_lost(&self, pointer_id: u32) {
        let shared = &self.shared;
        shared.gesture.lock().end_drag(Some(pointer_id));
        shared.auto_scroll.stop(pointer_id);
    }

    pub fn focus_changed(&self, focused: bool) {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return;
        }
        let previous = shared.focused.swap(focused, Ordering::AcqRel);
        if previous == focused {
            return;
        }
        debug!(target = "control::input", focused, "focus changed");
        if focused {
            shared.blink.focus_gained();
        } else {
            shared.blink.focus_lost();
            shared.gesture.lock().end_drag(None);
            shared.auto_scroll.cancel();
        }
        let report = shared
            .with_engine(|engine| engine.get_mode(TerminalMode::FocusEvents))
            .unwrap_or(false);
        if report {
            let bytes: &[u8] = if focused { b"\x1b[I" } else { b"\x1b[O" };
            shared.write_engine(bytes, "focus");
        }
    }

    /// Runs a shortcut command as if its key binding had been pressed.
    pub fn run_shortcut(&self, action: ShortcutAction) -> bool {
        if self.shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        self.shared.run_shortcut(action);
        true
    }
}

impl PointerGesture {
    /// Forgets the drag of `pointer_id`, or any drag when `None`.
    fn end_drag(&mut self, pointer_id: Option<u32>) -> bool {
        let owned = match pointer_id {
            Some(id) => self.dragging == Some(id),
            None => self.dragging.is_some(),
        };
        if owned {
            self.dragging = None;
            self.pending_anchor = None;
        }
        owned
    }
}

impl ControlShared {
    /// Typed input: clears any selection and snaps back to the live output.
    fn send_user_input(&self, bytes: &[u8], origin: &'static str) {
        if !self.send_bytes(bytes, origin) {
            return;
        }
        let cleared = self
            .with_engine(|engine| {
                let had = engine.has_selection();
                if had {
                    engine.clear_selection();
                }
                had
            })
            .unwrap_or(false);
        if cleared {
            self.redraw.submit(());
        }
        if self.settings().snap_on_input {
            self.scroll_to_bottom();
        }
    }

    fn run_shortcut(&self, action: ShortcutAction) {
        debug!(target = "control::input", action = %action, "running shortcut");
        match action {
            ShortcutAction::Copy => {
                self.copy_selection(false, true);
            }
            ShortcutAction::CopySingleLine => {
                self.copy_selection(true, true);
            }
            ShortcutAction::Paste => self.host.on_paste_requested(),
            ShortcutAction::ScrollUp => {
                self.scroll_by(-1);
            }
            ShortcutAction::ScrollDown => {
                self.scroll_by(1);
            }
            ShortcutAction::ScrollPageUp => {
                let page = self.scrollbar.state().view_height.max(1);
                self.scroll_by(-page);
            }
            ShortcutAction::ScrollPageDown => {
                let page = self.scrollbar.state().view_height.max(1);
                self.scroll_by(page);
            }
            ShortcutAction::ScrollToTop => {
                self.scroll_to(0);
            }
            ShortcutAction::ScrollToBottom => {
                let bottom = self.scrollbar.state().maximum();
                self.scroll_to(bottom);
            }
            ShortcutAction::IncreaseFontSize => self.font_shortcut(1),
            ShortcutAction::DecreaseFontSize => self.font_shortcut(-1),
            ShortcutAction::ResetFontSize => {
                let size = self.settings().font_size;
                if let Err(err) = self.apply_font_size(size, false) {
                    warn!(target = "control::input", error = %err, "font reset failed");
                }
            }
            ShortcutAction::ToggleReadOnly => self.toggle_read_only(),
            ShortcutAction::ClearSelection => {
                self.with_engine(|engine| engine.clear_selection());
                self.redraw.submit(());
            }
        }
    }

    fn font_shortcut(&self, delta: i32) {
        if let Err(err) = self.adjust_font_size(delta) {
            debug!(target = "control::input", delta, error = %err, "font size unchanged");
        }
    }

    fn pointer_action(&self, event: &PointerEvent, action: LocalPointerAction) {
        match action {
            LocalPointerAction::SelectionPress { extend } => self.selection_press(event, extend),
            LocalPointerAction::SelectionDrag => self.selection_drag(event),
            LocalPointerAction::SelectionRelease => self.selection_release(event),
            LocalPointerAction::Scroll { rows } => {
                self.scroll_by(rows);
            }
            LocalPointerAction::AdjustFontSize { delta } => self.font_shortcut(delta),
            LocalPointerAction::RightClick => {
                if !self.copy_selection(false, true) {
                    self.host.on_paste_requested();
                }
            }
        }
    }

    fn local_drag_action(&self, event: &PointerEvent) -> Option<LocalPointerAction> {
        if self.gesture.lock().dragging != Some(event.pointer_id) {
            return None;
        }
        match event.kind {
            PointerEventKind::Released(MouseButton::Left) => {
                Some(LocalPointerAction::SelectionRelease)
            }
            PointerEventKind::Moved if event.held == Some(MouseButton::Left) => {
                Some(LocalPointerAction::SelectionDrag)
            }
            _ => None,
        }
    }

    fn selection_press(&self, event: &PointerEvent, extend: bool) {
        let position = self.buffer_position(event.position);
        if extend {
            let extended = self
                .with_engine(|engine| {
                    let has = engine.has_selection();
                    if has {
                        engine.set_selection_end(position);
                    }
                    has
                })
                .unwrap_or(false);
            if extended {
                self.gesture.lock().dragging = Some(event.pointer_id);
                self.redraw.submit(());
                return;
            }
        }

        let now = Instant::now();
        let clicks = {
            let mut gesture = self.gesture.lock();
            let clicks = match gesture.last_click {
                Some((at, cell, count))
                    if cell == position && now.duration_since(at) <= MULTI_CLICK_WINDOW =>
                {
                    count % 3 + 1
                }
                _ => 1,
            };
            gesture.last_click = Some((now, position, clicks));
            gesture.dragging = Some(event.pointer_id);
            gesture.pending_anchor = (clicks == 1).then_some(position);
            clicks
        };
        trace!(target = "control::input", clicks, row = position.row, col = position.col, "selection press");
        self.with_engine(|engine| match clicks {
            1 => engine.clear_selection(),
            count => {
                let mode = if count == 2 {
                    SelectionMode::Word
                } else {
                    SelectionMode::Line
                };
                engine.set_selection_anchor(position, mode);
                engine.set_selection_end(position);
            }
        });
        self.redraw.submit(());
    }

    fn selection_drag(&self, event: &PointerEvent) {
        let anchor = {
            let mut gesture = self.gesture.lock();
            if gesture.dragging != Some(event.pointer_id) {
                return;
            }
            gesture.pending_anchor.take()
        };
        let position = self.buffer_position(event.position);
        self.with_engine(|engine| {
            if let Some(anchor) = anchor {
                engine.set_selection_anchor(anchor, SelectionMode::Cell);
            }
            engine.set_selection_end(position);
        });
        self.redraw.submit(());
        let bounds = self.viewport_bounds();
        self.auto_scroll
            .update_drag(event.pointer_id, event.position, bounds);
    }

    fn selection_release(&self, event: &PointerEvent) {
        if !self.gesture.lock().end_drag(Some(event.pointer_id)) {
            return;
        }
        self.auto_scroll.stop(event.pointer_id);
        if self.settings().copy_on_select {
            self.copy_selection(false, false);
        }
    }
}
