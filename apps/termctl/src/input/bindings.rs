use std::fmt;
use std::str::FromStr;

use crossterm::event::{KeyCode, KeyModifiers};

use crate::config::KeyBindingEntry;
use crate::control::ValidationError;

/// Commands a key binding can trigger instead of sending bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShortcutAction {
    Copy,
    CopySingleLine,
    Paste,
    ScrollUp,
    ScrollDown,
    ScrollPageUp,
    ScrollPageDown,
    ScrollToTop,
    ScrollToBottom,
    IncreaseFontSize,
    DecreaseFontSize,
    ResetFontSize,
    ToggleReadOnly,
    ClearSelection,
}

impl ShortcutAction {
    pub const ALL: [ShortcutAction; 14] = [
        ShortcutAction::Copy,
        ShortcutAction::CopySingleLine,
        ShortcutAction::Paste,
        ShortcutAction::ScrollUp,
        ShortcutAction::ScrollDown,
        ShortcutAction::ScrollPageUp,
        ShortcutAction::ScrollPageDown,
        ShortcutAction::ScrollToTop,
        ShortcutAction::ScrollToBottom,
        ShortcutAction::IncreaseFontSize,
        ShortcutAction::DecreaseFontSize,
        ShortcutAction::ResetFontSize,
        ShortcutAction::ToggleReadOnly,
        ShortcutAction::ClearSelection,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ShortcutAction::Copy => "copy",
            ShortcutAction::CopySingleLine => "copy_single_line",
            ShortcutAction::Paste => "paste",
            ShortcutAction::ScrollUp => "scroll_up",
            ShortcutAction::ScrollDown => "scroll_down",
            ShortcutAction::ScrollPageUp => "scroll_page_up",
            ShortcutAction::ScrollPageDown => "scroll_page_down",
            ShortcutAction::ScrollToTop => "scroll_to_top",
            ShortcutAction::ScrollToBottom => "scroll_to_bottom",
            ShortcutAction::IncreaseFontSize => "increase_font_size",
            ShortcutAction::DecreaseFontSize => "decrease_font_size",
            ShortcutAction::ResetFontSize => "reset_font_size",
            ShortcutAction::ToggleReadOnly => "toggle_read_only",
            ShortcutAction::ClearSelection => "clear_selection",
        }
    }
}

impl FromStr for ShortcutAction {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        ShortcutAction::ALL
            .into_iter()
            .find(|action| action.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownCommand(value.to_string()))
    }
}

impl fmt::Display for ShortcutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key plus the exact modifier set that must be held.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyChord {
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn matches(&self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        self.code == normalize_code(code) && self.modifiers == modifiers
    }
}

// Letters compare case-insensitively; Shift is carried by the modifier set.
fn normalize_code(code: KeyCode) -> KeyCode {
    match code {
        KeyCode::Char(ch) if ch.is_ascii_uppercase() => KeyCode::Char(ch.to_ascii_lowercase()),
        other => other,
    }
}

impl FromStr for KeyChord {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ValidationError::InvalidKeyChord {
            chord: value.to_string(),
            reason,
        };
        let mut modifiers = KeyModifiers::NONE;
        let mut key_token: Option<String> = None;
        for part in value.split('+') {
            let trimmed = part.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lower = trimmed.to_ascii_lowercase();
            match lower.as_str() {
                "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
                "alt" | "option" | "opt" => modifiers |= KeyModifiers::ALT,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                "super" | "win" | "cmd" | "command" => modifiers |= KeyModifiers::SUPER,
                token => {
                    if key_token.is_some() {
                        return Err(invalid("more than one key"));
                    }
                    key_token = Some(token.to_string());
                }
            }
        }

        let token = key_token.ok_or_else(|| invalid("missing key"))?;
        let code = match token.as_str() {
            "esc" | "escape" => KeyCode::Esc,
            "enter" | "return" => KeyCode::Enter,
            "tab" => KeyCode::Tab,
            "backspace" => KeyCode::Backspace,
            "pageup" | "pgup" => KeyCode::PageUp,
            "pagedown" | "pgdn" => KeyCode::PageDown,
            "home" => KeyCode::Home,
            "end" => KeyCode::End,
            "up" => KeyCode::Up,
            "down" => KeyCode::Down,
            "left" => KeyCode::Left,
            "right" => KeyCode::Right,
            "space" => KeyCode::Char(' '),
            "plus" => KeyCode::Char('+'),
            "delete" | "del" => KeyCode::Delete,
            "insert" | "ins" => KeyCode::Insert,
            other => {
                if let Some(number) = other.strip_prefix('f').filter(|rest| !rest.is_empty()) {
                    match number.parse::<u8>() {
                        Ok(n @ 1..=24) => KeyCode::F(n),
                        _ => return Err(invalid("unknown key")),
                    }
                } else {
                    let mut chars = other.chars();
                    let ch = chars.next().ok_or_else(|| invalid("missing key"))?;
                    if chars.next().is_some() {
                        return Err(invalid("unknown key"));
                    }
                    KeyCode::Char(ch)
                }
            }
        };
        Ok(KeyChord::new(code, modifiers))
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            parts.push("ctrl".to_string());
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            parts.push("alt".to_string());
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            parts.push("shift".to_string());
        }
        if self.modifiers.contains(KeyModifiers::SUPER) {
            parts.push("win".to_string());
        }
        let key = match self.code {
            KeyCode::Char(' ') => "space".to_string(),
            KeyCode::Char('+') => "plus".to_string(),
            KeyCode::Char(c) => c.to_string(),
            KeyCode::F(n) => format!("f{n}"),
            other => format!("{other:?}").to_ascii_lowercase(),
        };
        parts.push(key);
        f.write_str(&parts.join("+"))
    }
}

/// Ordered binding table; the first entry matching a key wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyBindings {
    entries: Vec<(KeyChord, ShortcutAction)>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: &[KeyBindingEntry]) -> Result<Self, ValidationError> {
        let mut bindings = Self::new();
        for entry in entries {
            let chord: KeyChord = entry.keys.parse()?;
            let action: ShortcutAction = entry.command.parse()?;
            bindings.push(chord, action);
        }
        Ok(bindings)
    }

    pub fn push(&mut self, chord: KeyChord, action: ShortcutAction) {
        self.entries.push((chord, action));
    }

    pub fn lookup(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<ShortcutAction> {
        self.entries
            .iter()
            .find(|(chord, _)| chord.matches(code, modifiers))
            .map(|(_, action)| *action)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(KeyChord, ShortcutAction)> {
        self.entries.iter()
    }
}
