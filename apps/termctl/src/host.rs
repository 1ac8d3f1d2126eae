//! Callbacks the control raises towards its host UI. Every method runs on the
//! delivery context; all default to no-ops.

use crate::engine::{ConnectionState, Rgb, TaskbarProgress};
use crate::scrollbar::ScrollbarUpdate;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontSizeChange {
    pub width: u32,
    pub height: u32,
    pub is_initial: bool,
}

pub trait ControlHost: Send + Sync {
    fn on_initialized(&self) {}
    fn on_scrollbar_update(&self, _update: ScrollbarUpdate) {}
    fn on_title_changed(&self, _title: &str) {}
    fn on_font_size_changed(&self, _change: FontSizeChange) {}
    fn on_cursor_visibility(&self, _visible: bool) {}
    fn on_taskbar_progress(&self, _progress: TaskbarProgress) {}
    fn on_connection_state(&self, _state: ConnectionState) {}
    fn on_tab_color_changed(&self, _color: Option<Rgb>) {}
    fn on_warning_bell(&self) {}
    /// `chunks` output notifications arrived since the previous call.
    fn on_output_activity(&self, _chunks: u64) {}
    fn on_copy_to_clipboard(&self, _text: String) {}
    fn on_paste_requested(&self) {}
    fn on_read_only_changed(&self, _read_only: bool) {}
    fn on_notice(&self, _notice: Notice) {}
}

/// Host that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullHost;

impl ControlHost for NullHost {}
