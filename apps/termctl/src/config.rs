use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::control::ValidationError;
use crate::input::bindings::KeyBindings;

pub const ENV_CURSOR_BLINK: &str = "TERMCTL_CURSOR_BLINK";
pub const ENV_FONT_SIZE: &str = "TERMCTL_FONT_SIZE";
pub const ENV_SCROLL_VELOCITY_SCALE: &str = "TERMCTL_SCROLL_VELOCITY_SCALE";
pub const ENV_KEYS: &str = "TERMCTL_KEYS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings: {0}")]
    Toml(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        ConfigError::Toml(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorStyle {
    #[default]
    Bar,
    Underscore,
    FilledBox,
    EmptyBox,
    DoubleUnderscore,
    Vintage,
}

/// One `keys = command` row of the binding table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindingEntry {
    pub keys: String,
    pub command: String,
}

impl KeyBindingEntry {
    pub fn new(keys: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            keys: keys.into(),
            command: command.into(),
        }
    }
}

/// Read-only settings snapshot consumed by `initialize` and
/// `update_settings`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub cursor_blink: bool,
    pub cursor_blink_interval_ms: u64,
    pub font_size: i32,
    pub cursor_style: CursorStyle,
    pub scroll_velocity_scale: f64,
    /// Rows per second.
    pub max_auto_scroll_velocity: f64,
    pub auto_scroll_interval_ms: u64,
    pub redraw_interval_ms: u64,
    pub scrollbar_interval_ms: u64,
    pub title_interval_ms: u64,
    pub output_activity_interval_ms: u64,
    /// Pixels between the surface edge and the cell grid, on every side.
    pub padding: f32,
    pub wheel_lines: u16,
    pub snap_on_input: bool,
    pub copy_on_select: bool,
    pub key_bindings: Vec<KeyBindingEntry>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            cursor_blink: true,
            cursor_blink_interval_ms: 530,
            font_size: 12,
            cursor_style: CursorStyle::Bar,
            scroll_velocity_scale: 1.0,
            max_auto_scroll_velocity: 400.0,
            auto_scroll_interval_ms: 33,
            redraw_interval_ms: 16,
            scrollbar_interval_ms: 8,
            title_interval_ms: 50,
            output_activity_interval_ms: 500,
            padding: 8.0,
            wheel_lines: 3,
            snap_on_input: true,
            copy_on_select: false,
            key_bindings: default_key_bindings(),
        }
    }
}

fn default_key_bindings() -> Vec<KeyBindingEntry> {
    [
        ("ctrl+shift+c", "copy"),
        ("ctrl+shift+v", "paste"),
        ("ctrl+shift+up", "scroll_up"),
        ("ctrl+shift+down", "scroll_down"),
        ("ctrl+shift+pageup", "scroll_page_up"),
        ("ctrl+shift+pagedown", "scroll_page_down"),
        ("ctrl+shift+home", "scroll_to_top"),
        ("ctrl+shift+end", "scroll_to_bottom"),
        ("ctrl+=", "increase_font_size"),
        ("ctrl+-", "decrease_font_size"),
        ("ctrl+0", "reset_font_size"),
    ]
    .into_iter()
    .map(|(keys, command)| KeyBindingEntry::new(keys, command))
    .collect()
}

impl ControlSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: ControlSettings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads, applies environment overrides, then validates.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings: ControlSettings = toml::from_str(&raw)?;
        settings.apply_env_overrides();
        settings.validate()?;
        debug!(target = "config", path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Environment values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(blink) = env_parse::<bool>(ENV_CURSOR_BLINK) {
            self.cursor_blink = blink;
        }
        if let Some(size) = env_parse::<i32>(ENV_FONT_SIZE) {
            self.font_size = size;
        }
        if let Some(scale) = env_parse::<f64>(ENV_SCROLL_VELOCITY_SCALE) {
            self.scroll_velocity_scale = scale;
        }
        if let Ok(raw) = env::var(ENV_KEYS) {
            for pair in raw.split(',') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                match pair.rsplit_once('=') {
                    Some((keys, command)) if !keys.trim().is_empty() => {
                        self.key_bindings
                            .push(KeyBindingEntry::new(keys.trim(), command.trim()));
                    }
                    _ => debug!(target = "config", pair, "ignoring malformed {ENV_KEYS} entry"),
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.font_size <= 0 {
            return Err(ValidationError::InvalidFontSize(self.font_size));
        }
        for (name, value) in [
            ("cursor_blink_interval_ms", self.cursor_blink_interval_ms),
            ("auto_scroll_interval_ms", self.auto_scroll_interval_ms),
            ("redraw_interval_ms", self.redraw_interval_ms),
            ("scrollbar_interval_ms", self.scrollbar_interval_ms),
            ("title_interval_ms", self.title_interval_ms),
            ("output_activity_interval_ms", self.output_activity_interval_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::InvalidInterval { name });
            }
        }
        for (name, value) in [
            ("scroll_velocity_scale", self.scroll_velocity_scale),
            ("max_auto_scroll_velocity", self.max_auto_scroll_velocity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ValidationError::InvalidVelocity { name, value });
            }
        }
        if !self.padding.is_finite() || self.padding < 0.0 {
            return Err(ValidationError::InvalidPadding(self.padding));
        }
        if self.wheel_lines == 0 {
            return Err(ValidationError::InvalidWheelLines);
        }
        self.key_bindings()?;
        Ok(())
    }

    /// Parses the binding table.
    pub fn key_bindings(&self) -> Result<KeyBindings, ValidationError> {
        KeyBindings::from_entries(&self.key_bindings)
    }

    pub fn cursor_blink_interval(&self) -> Duration {
        Duration::from_millis(self.cursor_blink_interval_ms)
    }

    pub fn auto_scroll_interval(&self) -> Duration {
        Duration::from_millis(self.auto_scroll_interval_ms)
    }

    pub fn redraw_interval(&self) -> Duration {
        Duration::from_millis(self.redraw_interval_ms)
    }

    pub fn scrollbar_interval(&self) -> Duration {
        Duration::from_millis(self.scrollbar_interval_ms)
    }

    pub fn title_interval(&self) -> Duration {
        Duration::from_millis(self.title_interval_ms)
    }

    pub fn output_activity_interval(&self) -> Duration {
        Duration::from_millis(self.output_activity_interval_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(target = "config", var = name, value = %raw, "ignoring unparsable override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{LazyLock, Mutex};

    // Environment variables are process-wide.
    static ENV_MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

    fn clear_env() {
        unsafe {
            env::remove_var(ENV_CURSOR_BLINK);
            env::remove_var(ENV_FONT_SIZE);
            env::remove_var(ENV_SCROLL_VELOCITY_SCALE);
            env::remove_var(ENV_KEYS);
        }
    }

    #[test]
    fn defaults_are_valid() {
        let settings = ControlSettings::default();
        settings.validate().expect("defaults validate");
        assert!(settings.cursor_blink);
        assert_eq!(settings.cursor_blink_interval(), Duration::from_millis(530));
        assert_eq!(settings.font_size, 12);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings = ControlSettings::from_toml_str(
            r#"
            font_size = 14
            cursor_style = "filled_box"
            copy_on_select = true

            [[key_bindings]]
            keys = "alt+f11"
            command = "toggle_read_only"
            "#,
        )
        .expect("parse");
        assert_eq!(settings.font_size, 14);
        assert_eq!(settings.cursor_style, CursorStyle::FilledBox);
        assert!(settings.copy_on_select);
        assert_eq!(settings.redraw_interval_ms, 16);
        assert_eq!(
            settings.key_bindings,
            vec![KeyBindingEntry::new("alt+f11", "toggle_read_only")]
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = ControlSettings::from_toml_str("font_size = 0").expect_err("zero font");
        assert!(matches!(err, ConfigError::Invalid(ValidationError::InvalidFontSize(0))));

        let err = ControlSettings::from_toml_str("scroll_velocity_scale = -1.0")
            .expect_err("negative scale");
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::InvalidVelocity { name: "scroll_velocity_scale", .. })
        ));

        let err = ControlSettings::from_toml_str(
            "[[key_bindings]]\nkeys = \"ctrl+q\"\ncommand = \"launch_rockets\"",
        )
        .expect_err("unknown command");
        assert!(matches!(
            err,
            ConfigError::Invalid(ValidationError::UnknownCommand(ref cmd)) if cmd == "launch_rockets"
        ));

        let err = ControlSettings::from_toml_str("cursor_style = \"blinking\"")
            .expect_err("unknown style");
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        clear_env();
        unsafe {
            env::set_var(ENV_CURSOR_BLINK, "false");
            env::set_var(ENV_FONT_SIZE, "not-a-number");
            env::set_var(ENV_SCROLL_VELOCITY_SCALE, "2.5");
            env::set_var(ENV_KEYS, "ctrl+shift+x=copy_single_line, ctrl+== increase_font_size,broken");
        }

        let mut settings = ControlSettings::default();
        let defaults = settings.key_bindings.len();
        settings.apply_env_overrides();
        clear_env();

        assert!(!settings.cursor_blink);
        assert_eq!(settings.font_size, 12, "unparsable override is ignored");
        assert_eq!(settings.scroll_velocity_scale, 2.5);
        assert_eq!(settings.key_bindings.len(), defaults + 2);
        assert_eq!(
            settings.key_bindings[defaults],
            KeyBindingEntry::new("ctrl+shift+x", "copy_single_line")
        );
        assert_eq!(
            settings.key_bindings[defaults + 1],
            KeyBindingEntry::new("ctrl+=", "increase_font_size")
        );
        settings.validate().expect("overridden settings validate");
    }

    #[test]
    fn load_reports_missing_file() {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        let err = ControlSettings::load(Path::new("/nonexistent/termctl.toml"))
            .expect_err("missing file");
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
