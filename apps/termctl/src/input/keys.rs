//! Default VT encoding of key presses.

use crossterm::event::{KeyCode, KeyModifiers};

use crate::engine::{ModeQuery, TerminalMode};

const ESC: u8 = 0x1b;

/// A raw key transition as delivered by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub code: KeyCode,
    /// Hardware scan code. Carried for hosts that need it; encoding only
    /// looks at `code`.
    pub scan_code: u16,
    pub modifiers: KeyModifiers,
    pub key_down: bool,
    /// The key came from the numeric keypad.
    pub keypad: bool,
}

impl KeyInput {
    pub fn down(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self {
            code,
            scan_code: 0,
            modifiers,
            key_down: true,
            keypad: false,
        }
    }

    pub fn up(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self {
            key_down: false,
            ..Self::down(code, modifiers)
        }
    }

    pub fn with_scan_code(mut self, scan_code: u16) -> Self {
        self.scan_code = scan_code;
        self
    }

    pub fn on_keypad(mut self) -> Self {
        self.keypad = true;
        self
    }
}

/// xterm modifier parameter: `1 + shift + 2·alt + 4·ctrl`.
pub fn modifier_param(modifiers: KeyModifiers) -> u8 {
    let mut param = 1;
    if modifiers.contains(KeyModifiers::SHIFT) {
        param += 1;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        param += 2;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        param += 4;
    }
    param
}

/// Bytes for a key-down, or `None` when the key produces nothing here (plain
/// printable keys arrive through the character path instead).
pub fn encode_key<M: ModeQuery + ?Sized>(input: &KeyInput, modes: &M) -> Option<Vec<u8>> {
    if !input.key_down {
        return None;
    }
    let mods = input.modifiers;
    let alt = mods.contains(KeyModifiers::ALT);
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    let shift = mods.contains(KeyModifiers::SHIFT);

    if input.keypad && modes.get_mode(TerminalMode::KeypadApplication) && !ctrl && !alt {
        if let Some(bytes) = application_keypad(input.code) {
            return Some(bytes);
        }
    }

    let bytes = match input.code {
        KeyCode::Up => cursor_key(b'A', mods, modes),
        KeyCode::Down => cursor_key(b'B', mods, modes),
        KeyCode::Right => cursor_key(b'C', mods, modes),
        KeyCode::Left => cursor_key(b'D', mods, modes),
        KeyCode::Home => cursor_key(b'H', mods, modes),
        KeyCode::End => cursor_key(b'F', mods, modes),
        KeyCode::Insert => tilde_key(2, mods),
        KeyCode::Delete => tilde_key(3, mods),
        KeyCode::PageUp => tilde_key(5, mods),
        KeyCode::PageDown => tilde_key(6, mods),
        KeyCode::F(n @ 1..=4) => {
            let last = b'P' + (n - 1);
            if modifier_param(mods) > 1 {
                csi_with_param(1, modifier_param(mods), last)
            } else {
                vec![ESC, b'O', last]
            }
        }
        KeyCode::F(n @ 5..=12) => {
            let number = match n {
                5 => 15,
                6 => 17,
                7 => 18,
                8 => 19,
                9 => 20,
                10 => 21,
                11 => 23,
                _ => 24,
            };
            tilde_key(number, mods)
        }
        KeyCode::Enter => {
            let mut bytes = alt_prefix(alt);
            if modes.get_mode(TerminalMode::LineFeed) {
                bytes.extend_from_slice(b"\r\n");
            } else {
                bytes.push(b'\r');
            }
            bytes
        }
        KeyCode::Tab if shift => b"\x1b[Z".to_vec(),
        KeyCode::Tab => {
            let mut bytes = alt_prefix(alt);
            bytes.push(b'\t');
            bytes
        }
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => {
            let mut bytes = alt_prefix(alt);
            bytes.push(if ctrl { 0x08 } else { 0x7f });
            bytes
        }
        KeyCode::Esc => {
            let mut bytes = alt_prefix(alt);
            bytes.push(ESC);
            bytes
        }
        KeyCode::Char(ch) if ctrl => {
            let code = control_code(ch)?;
            let mut bytes = alt_prefix(alt && !is_altgr(mods));
            bytes.push(code);
            bytes
        }
        _ => return None,
    };
    Some(bytes)
}

/// Encodes composed text. Alt without Ctrl prefixes ESC; Ctrl+Alt is
/// treated as AltGr and sends the character as-is.
pub fn encode_char(ch: char, modifiers: KeyModifiers) -> Vec<u8> {
    let mut bytes = alt_prefix(modifiers.contains(KeyModifiers::ALT) && !is_altgr(modifiers));
    let mut buf = [0u8; 4];
    bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
    bytes
}

fn is_altgr(modifiers: KeyModifiers) -> bool {
    modifiers.contains(KeyModifiers::ALT | KeyModifiers::CONTROL)
}

fn alt_prefix(alt: bool) -> Vec<u8> {
    if alt { vec![ESC] } else { Vec::new() }
}

fn cursor_key<M: ModeQuery + ?Sized>(last: u8, mods: KeyModifiers, modes: &M) -> Vec<u8> {
    let param = modifier_param(mods);
    if param > 1 {
        csi_with_param(1, param, last)
    } else if modes.get_mode(TerminalMode::CursorKeysApplication) {
        vec![ESC, b'O', last]
    } else {
        vec![ESC, b'[', last]
    }
}

fn tilde_key(number: u8, mods: KeyModifiers) -> Vec<u8> {
    let param = modifier_param(mods);
    if param > 1 {
        format!("\x1b[{number};{param}~").into_bytes()
    } else {
        format!("\x1b[{number}~").into_bytes()
    }
}

fn csi_with_param(first: u8, param: u8, last: u8) -> Vec<u8> {
    let mut bytes = format!("\x1b[{first};{param}").into_bytes();
    bytes.push(last);
    bytes
}

fn application_keypad(code: KeyCode) -> Option<Vec<u8>> {
    let last = match code {
        KeyCode::Enter => b'M',
        KeyCode::Char(digit @ '0'..='9') => b'p' + (digit as u8 - b'0'),
        KeyCode::Char('.') => b'n',
        KeyCode::Char('+') => b'k',
        KeyCode::Char('-') => b'm',
        KeyCode::Char('*') => b'j',
        KeyCode::Char('/') => b'o',
        _ => return None,
    };
    Some(vec![ESC, b'O', last])
}

fn control_code(ch: char) -> Option<u8> {
    match ch.to_ascii_lowercase() {
        letter @ 'a'..='z' => Some(letter as u8 - b'a' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '-' | '/' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct Modes(HashSet<TerminalMode>);

    impl Modes {
        fn with(mode: TerminalMode) -> Self {
            Self(HashSet::from([mode]))
        }
    }

    impl ModeQuery for Modes {
        fn get_mode(&self, mode: TerminalMode) -> bool {
            self.0.contains(&mode)
        }
    }

    fn encode(code: KeyCode, modifiers: KeyModifiers, modes: &Modes) -> Option<Vec<u8>> {
        encode_key(&KeyInput::down(code, modifiers), modes)
    }

    #[test]
    fn cursor_keys_follow_application_mode() {
        let normal = Modes::default();
        let app = Modes::with(TerminalMode::CursorKeysApplication);
        assert_eq!(encode(KeyCode::Up, KeyModifiers::NONE, &normal), Some(b"\x1b[A".to_vec()));
        assert_eq!(encode(KeyCode::Up, KeyModifiers::NONE, &app), Some(b"\x1bOA".to_vec()));
        assert_eq!(
            encode(KeyCode::Left, KeyModifiers::CONTROL | KeyModifiers::SHIFT, &app),
            Some(b"\x1b[1;6D".to_vec()),
            "modifiers override application mode"
        );
    }

    #[test]
    fn editing_and_function_keys() {
        let modes = Modes::default();
        assert_eq!(encode(KeyCode::Delete, KeyModifiers::NONE, &modes), Some(b"\x1b[3~".to_vec()));
        assert_eq!(
            encode(KeyCode::PageUp, KeyModifiers::ALT, &modes),
            Some(b"\x1b[5;3~".to_vec())
        );
        assert_eq!(encode(KeyCode::F(1), KeyModifiers::NONE, &modes), Some(b"\x1bOP".to_vec()));
        assert_eq!(
            encode(KeyCode::F(4), KeyModifiers::SHIFT, &modes),
            Some(b"\x1b[1;2S".to_vec())
        );
        assert_eq!(encode(KeyCode::F(5), KeyModifiers::NONE, &modes), Some(b"\x1b[15~".to_vec()));
        assert_eq!(encode(KeyCode::F(12), KeyModifiers::NONE, &modes), Some(b"\x1b[24~".to_vec()));
        assert_eq!(encode(KeyCode::F(13), KeyModifiers::NONE, &modes), None);
    }

    #[test]
    fn enter_tab_backspace_escape() {
        let modes = Modes::default();
        assert_eq!(encode(KeyCode::Enter, KeyModifiers::NONE, &modes), Some(b"\r".to_vec()));
        assert_eq!(
            encode(KeyCode::Enter, KeyModifiers::NONE, &Modes::with(TerminalMode::LineFeed)),
            Some(b"\r\n".to_vec())
        );
        assert_eq!(encode(KeyCode::Tab, KeyModifiers::SHIFT, &modes), Some(b"\x1b[Z".to_vec()));
        assert_eq!(encode(KeyCode::BackTab, KeyModifiers::SHIFT, &modes), Some(b"\x1b[Z".to_vec()));
        assert_eq!(encode(KeyCode::Backspace, KeyModifiers::NONE, &modes), Some(vec![0x7f]));
        assert_eq!(encode(KeyCode::Backspace, KeyModifiers::CONTROL, &modes), Some(vec![0x08]));
        assert_eq!(encode(KeyCode::Esc, KeyModifiers::ALT, &modes), Some(vec![ESC, ESC]));
    }

    #[test]
    fn control_characters() {
        let modes = Modes::default();
        assert_eq!(encode(KeyCode::Char('c'), KeyModifiers::CONTROL, &modes), Some(vec![0x03]));
        assert_eq!(encode(KeyCode::Char('C'), KeyModifiers::CONTROL, &modes), Some(vec![0x03]));
        assert_eq!(encode(KeyCode::Char(' '), KeyModifiers::CONTROL, &modes), Some(vec![0x00]));
        assert_eq!(encode(KeyCode::Char('['), KeyModifiers::CONTROL, &modes), Some(vec![0x1b]));
        assert_eq!(
            encode(KeyCode::Char('a'), KeyModifiers::CONTROL | KeyModifiers::ALT, &modes),
            Some(vec![0x01]),
            "ctrl+alt is AltGr"
        );
        assert_eq!(encode(KeyCode::Char('!'), KeyModifiers::CONTROL, &modes), None);
    }

    #[test]
    fn printable_keys_and_key_up_produce_nothing() {
        let modes = Modes::default();
        assert_eq!(encode(KeyCode::Char('a'), KeyModifiers::NONE, &modes), None);
        assert_eq!(encode(KeyCode::Char('A'), KeyModifiers::SHIFT, &modes), None);
        assert_eq!(
            encode_key(&KeyInput::up(KeyCode::Up, KeyModifiers::NONE), &modes),
            None
        );
    }

    #[test]
    fn application_keypad() {
        let app = Modes::with(TerminalMode::KeypadApplication);
        let five = KeyInput::down(KeyCode::Char('5'), KeyModifiers::NONE).on_keypad();
        assert_eq!(encode_key(&five, &app), Some(b"\x1bOu".to_vec()));
        let enter = KeyInput::down(KeyCode::Enter, KeyModifiers::NONE).on_keypad();
        assert_eq!(encode_key(&enter, &app), Some(b"\x1bOM".to_vec()));
        assert_eq!(encode_key(&five, &Modes::default()), None, "numeric mode sends text");
    }

    #[test]
    fn characters_encode_as_utf8_with_alt_prefix() {
        assert_eq!(encode_char('é', KeyModifiers::NONE), "é".as_bytes().to_vec());
        assert_eq!(encode_char('x', KeyModifiers::ALT), vec![ESC, b'x']);
        assert_eq!(
            encode_char('@', KeyModifiers::ALT | KeyModifiers::CONTROL),
            vec![b'@']
        );
    }
}
