//! Pointer translation: terminal mouse reports or local UI actions.

use crossterm::event::{KeyModifiers, MouseButton};

use crate::engine::{MouseModeSnapshot, MouseTracking};

/// Highest 1-based coordinate the legacy `ESC [ M` encoding can carry.
pub const LEGACY_COORD_LIMIT: u16 = 223;

/// Most notches a single wheel event turns into when it becomes repeated
/// bytes for the engine.
pub const WHEEL_REPEAT_LIMIT: u32 = 64;

/// Pointer position in surface pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerEventKind {
    Pressed(MouseButton),
    Released(MouseButton),
    Moved,
    /// Positive notches scroll up, towards older output.
    Wheel { notches: i32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub kind: PointerEventKind,
    pub position: PointerPosition,
    pub modifiers: KeyModifiers,
    /// Button held during a move, if any.
    pub held: Option<MouseButton>,
}

impl PointerEvent {
    pub fn new(pointer_id: u32, kind: PointerEventKind, position: PointerPosition) -> Self {
        Self {
            pointer_id,
            kind,
            position,
            modifiers: KeyModifiers::NONE,
            held: None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: KeyModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn holding(mut self, button: MouseButton) -> Self {
        self.held = Some(button);
        self
    }
}

/// Zero-based cell inside the visible grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViewportCell {
    pub row: u16,
    pub col: u16,
}

/// Everything translation needs besides the event, sampled once per event.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerContext {
    /// `None` when the pointer is outside the engine's input region.
    pub cell: Option<ViewportCell>,
    pub mouse: MouseModeSnapshot,
    pub application_cursor: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalPointerAction {
    /// Left press. `extend` when Shift was held.
    SelectionPress { extend: bool },
    SelectionDrag,
    SelectionRelease,
    /// Negative rows scroll towards older output.
    Scroll { rows: i32 },
    AdjustFontSize { delta: i32 },
    RightClick,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PointerTranslation {
    Report(Vec<u8>),
    Local(LocalPointerAction),
    Ignored,
}

pub fn translate_pointer(
    event: &PointerEvent,
    ctx: &PointerContext,
    wheel_lines: u16,
) -> PointerTranslation {
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);
    if ctx.mouse.is_reporting() && !shift {
        if let Some(cell) = ctx.cell {
            return match report(event, cell, &ctx.mouse) {
                Some(bytes) => PointerTranslation::Report(bytes),
                None => PointerTranslation::Ignored,
            };
        }
    }
    local(event, ctx, wheel_lines)
}

fn local(event: &PointerEvent, ctx: &PointerContext, wheel_lines: u16) -> PointerTranslation {
    let shift = event.modifiers.contains(KeyModifiers::SHIFT);
    let action = match event.kind {
        PointerEventKind::Wheel { notches: 0 } => return PointerTranslation::Ignored,
        PointerEventKind::Wheel { notches } => {
            if event.modifiers.contains(KeyModifiers::CONTROL) {
                LocalPointerAction::AdjustFontSize {
                    delta: notches.signum(),
                }
            } else if ctx.mouse.alternate_scroll
                && ctx.mouse.alternate_screen
                && !ctx.mouse.is_reporting()
            {
                return PointerTranslation::Report(alternate_scroll_bytes(
                    notches,
                    wheel_lines,
                    ctx.application_cursor,
                ));
            } else {
                LocalPointerAction::Scroll {
                    rows: notches
                        .saturating_neg()
                        .saturating_mul(i32::from(wheel_lines)),
                }
            }
        }
        PointerEventKind::Pressed(MouseButton::Left) => {
            LocalPointerAction::SelectionPress { extend: shift }
        }
        PointerEventKind::Pressed(MouseButton::Right) => LocalPointerAction::RightClick,
        PointerEventKind::Moved if event.held == Some(MouseButton::Left) => {
            LocalPointerAction::SelectionDrag
        }
        PointerEventKind::Released(MouseButton::Left) => LocalPointerAction::SelectionRelease,
        _ => return PointerTranslation::Ignored,
    };
    PointerTranslation::Local(action)
}

fn alternate_scroll_bytes(notches: i32, wheel_lines: u16, application_cursor: bool) -> Vec<u8> {
    let last = if notches > 0 { b'A' } else { b'B' };
    let intro = if application_cursor { b'O' } else { b'[' };
    let count = wheel_repeats(notches) as usize * usize::from(wheel_lines);
    let mut bytes = Vec::with_capacity(count * 3);
    for _ in 0..count {
        bytes.extend_from_slice(&[0x1b, intro, last]);
    }
    bytes
}

fn wheel_repeats(notches: i32) -> u32 {
    notches.unsigned_abs().min(WHEEL_REPEAT_LIMIT)
}

fn button_code(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Middle => 1,
        MouseButton::Right => 2,
    }
}

fn modifier_bits(modifiers: KeyModifiers) -> u8 {
    let mut bits = 0;
    if modifiers.contains(KeyModifiers::SHIFT) {
        bits |= 4;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        bits |= 8;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        bits |= 16;
    }
    bits
}

fn report(event: &PointerEvent, cell: ViewportCell, modes: &MouseModeSnapshot) -> Option<Vec<u8>> {
    let mods = modifier_bits(event.modifiers);
    match event.kind {
        PointerEventKind::Pressed(button) => {
            encode_report(button_code(button) | mods, true, cell, modes.sgr)
        }
        PointerEventKind::Released(button) => {
            // Legacy encoding cannot say which button was released.
            let code = if modes.sgr { button_code(button) } else { 3 };
            encode_report(code | mods, false, cell, modes.sgr)
        }
        PointerEventKind::Moved => {
            let code = match (modes.tracking, event.held) {
                (MouseTracking::AnyEvent, None) => 3,
                (MouseTracking::AnyEvent | MouseTracking::ButtonEvent, Some(button)) => {
                    button_code(button)
                }
                _ => return None,
            };
            encode_report((code + 32) | mods, true, cell, modes.sgr)
        }
        PointerEventKind::Wheel { notches: 0 } => None,
        PointerEventKind::Wheel { notches } => {
            let code = if notches > 0 { 64 } else { 65 };
            let single = encode_report(code | mods, true, cell, modes.sgr)?;
            Some(single.repeat(wheel_repeats(notches) as usize))
        }
    }
}

fn encode_report(code: u8, pressed: bool, cell: ViewportCell, sgr: bool) -> Option<Vec<u8>> {
    let col = cell.col.saturating_add(1);
    let row = cell.row.saturating_add(1);
    if sgr {
        let suffix = if pressed { 'M' } else { 'm' };
        return Some(format!("\x1b[<{code};{col};{row}{suffix}").into_bytes());
    }
    if col > LEGACY_COORD_LIMIT || row > LEGACY_COORD_LIMIT {
        return None;
    }
    Some(vec![
        0x1b,
        b'[',
        b'M',
        32 + code,
        32 + col as u8,
        32 + row as u8,
    ])
}
