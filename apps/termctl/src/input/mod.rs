//! Input translation: keys, composed characters and pointer events into
//! either shortcut commands, terminal byte sequences, or local UI actions.

pub mod bindings;
pub mod keys;
pub mod mouse;

pub use bindings::{KeyBindings, KeyChord, ShortcutAction};
pub use keys::KeyInput;
pub use mouse::{
    LocalPointerAction, PointerContext, PointerEvent, PointerEventKind, PointerPosition,
    PointerTranslation, ViewportCell,
};

use crossterm::event::KeyModifiers;

use crate::config::ControlSettings;
use crate::control::ValidationError;
use crate::engine::ModeQuery;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyTranslation {
    /// A binding matched; no bytes may be sent for this key.
    Binding(ShortcutAction),
    Sequence(Vec<u8>),
    Unhandled,
}

/// Stateless translator built from the binding table and wheel settings.
/// Input modes are read from the engine on every call.
#[derive(Clone, Debug, Default)]
pub struct InputTranslator {
    bindings: KeyBindings,
    wheel_lines: u16,
}

impl InputTranslator {
    pub fn new(bindings: KeyBindings, wheel_lines: u16) -> Self {
        Self {
            bindings,
            wheel_lines: wheel_lines.max(1),
        }
    }

    pub fn from_settings(settings: &ControlSettings) -> Result<Self, ValidationError> {
        Ok(Self::new(settings.key_bindings()?, settings.wheel_lines))
    }

    pub fn bindings(&self) -> &KeyBindings {
        &self.bindings
    }

    pub fn wheel_lines(&self) -> u16 {
        self.wheel_lines
    }

    pub fn translate_key<M>(&self, input: &KeyInput, modes: &M) -> KeyTranslation
    where
        M: ModeQuery + ?Sized,
    {
        if !input.key_down {
            return KeyTranslation::Unhandled;
        }
        if let Some(action) = self.bindings.lookup(input.code, input.modifiers) {
            return KeyTranslation::Binding(action);
        }
        match keys::encode_key(input, modes) {
            Some(bytes) => KeyTranslation::Sequence(bytes),
            None => KeyTranslation::Unhandled,
        }
    }

    /// Composed text skips binding resolution.
    pub fn translate_char(&self, ch: char, modifiers: KeyModifiers) -> Vec<u8> {
        keys::encode_char(ch, modifiers)
    }

    pub fn translate_pointer(
        &self,
        event: &PointerEvent,
        ctx: &PointerContext,
    ) -> PointerTranslation {
        mouse::translate_pointer(event, ctx, self.wheel_lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyBindingEntry;
    use crate::engine::TerminalMode;
    use crossterm::event::KeyCode;

    struct NoModes;

    impl ModeQuery for NoModes {
        fn get_mode(&self, _mode: TerminalMode) -> bool {
            false
        }
    }

    fn translator(entries: &[(&str, &str)]) -> InputTranslator {
        let entries: Vec<_> = entries
            .iter()
            .map(|(keys, command)| KeyBindingEntry::new(*keys, *command))
            .collect();
        InputTranslator::new(KeyBindings::from_entries(&entries).expect("bindings"), 3)
    }

    #[test]
    fn bound_keys_never_produce_bytes() {
        let translator = translator(&[
            ("ctrl+c", "copy"),
            ("up", "scroll_up"),
            ("ctrl+shift+v", "paste"),
        ]);
        for (code, modifiers, action) in [
            (KeyCode::Char('c'), KeyModifiers::CONTROL, ShortcutAction::Copy),
            (KeyCode::Up, KeyModifiers::NONE, ShortcutAction::ScrollUp),
            (
                KeyCode::Char('V'),
                KeyModifiers::CONTROL | KeyModifiers::SHIFT,
                ShortcutAction::Paste,
            ),
        ] {
            assert_eq!(
                translator.translate_key(&KeyInput::down(code, modifiers), &NoModes),
                KeyTranslation::Binding(action),
                "{code:?} {modifiers:?}"
            );
        }
    }

    #[test]
    fn unbound_keys_fall_through_to_encoding() {
        let translator = translator(&[("ctrl+shift+c", "copy")]);
        assert_eq!(
            translator.translate_key(&KeyInput::down(KeyCode::Char('c'), KeyModifiers::CONTROL), &NoModes),
            KeyTranslation::Sequence(vec![0x03])
        );
        assert_eq!(
            translator.translate_key(&KeyInput::down(KeyCode::Char('c'), KeyModifiers::NONE), &NoModes),
            KeyTranslation::Unhandled
        );
    }

    #[test]
    fn key_up_is_never_bound() {
        let translator = translator(&[("ctrl+c", "copy")]);
        assert_eq!(
            translator.translate_key(&KeyInput::up(KeyCode::Char('c'), KeyModifiers::CONTROL), &NoModes),
            KeyTranslation::Unhandled
        );
    }

    #[test]
    fn characters_bypass_bindings() {
        let translator = translator(&[("a", "copy")]);
        assert_eq!(translator.translate_char('a', KeyModifiers::NONE), b"a".to_vec());
    }
}
