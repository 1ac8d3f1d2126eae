//! The terminal engine as seen from the control: an external collaborator
//! that owns the buffer, parser and connection.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::scrollbar::ScrollState;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("invalid grid size {rows}x{cols}")]
    InvalidSize { rows: u16, cols: u16 },
    #[error("engine error: {0}")]
    Other(String),
}

/// Input-mode flags the engine tracks on behalf of the application running
/// inside it. Always read at translation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminalMode {
    /// DECCKM.
    CursorKeysApplication,
    /// DECKPAM / DECKPNM.
    KeypadApplication,
    /// LNM: Enter sends CR LF.
    LineFeed,
    /// DECSET 2004.
    BracketedPaste,
    /// DECSET 1004.
    FocusEvents,
    /// DECSET 1000.
    MouseDefault,
    /// DECSET 1002.
    MouseButtonEvent,
    /// DECSET 1003.
    MouseAnyEvent,
    /// DECSET 1006.
    MouseSgr,
    /// DECSET 1007.
    AlternateScroll,
    /// DECSET 1049 and friends.
    AlternateScreen,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MouseTracking {
    #[default]
    Off,
    /// Presses and releases only.
    Default,
    /// Presses, releases and motion while a button is held.
    ButtonEvent,
    /// Every motion.
    AnyEvent,
}

/// The mouse-reporting state as one snapshot, so a single pointer event is
/// translated against a consistent view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MouseModeSnapshot {
    pub tracking: MouseTracking,
    pub sgr: bool,
    pub alternate_scroll: bool,
    pub alternate_screen: bool,
}

impl MouseModeSnapshot {
    pub fn is_reporting(&self) -> bool {
        self.tracking != MouseTracking::Off
    }
}

pub trait ModeQuery {
    fn get_mode(&self, mode: TerminalMode) -> bool;

    /// Engines that can read all mouse flags under one lock should override
    /// this.
    fn mouse_modes(&self) -> MouseModeSnapshot {
        let tracking = if self.get_mode(TerminalMode::MouseAnyEvent) {
            MouseTracking::AnyEvent
        } else if self.get_mode(TerminalMode::MouseButtonEvent) {
            MouseTracking::ButtonEvent
        } else if self.get_mode(TerminalMode::MouseDefault) {
            MouseTracking::Default
        } else {
            MouseTracking::Off
        };
        MouseModeSnapshot {
            tracking,
            sgr: self.get_mode(TerminalMode::MouseSgr),
            alternate_scroll: self.get_mode(TerminalMode::AlternateScroll),
            alternate_screen: self.get_mode(TerminalMode::AlternateScreen),
        }
    }
}

/// Absolute buffer coordinate (row counts from the top of the scrollback).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CellPosition {
    pub row: i32,
    pub col: i32,
}

impl CellPosition {
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    #[default]
    Cell,
    Word,
    Line,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskbarState {
    #[default]
    Clear,
    Normal,
    Error,
    Indeterminate,
    Paused,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TaskbarProgress {
    pub state: TaskbarState,
    /// 0..=100.
    pub progress: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Notifications the engine raises from its own threads.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    OutputReceived,
    RenderNeeded,
    ScrollPositionChanged(ScrollState),
    FontSizeChanged { width: u32, height: u32 },
    TitleChanged(String),
    TaskbarProgressChanged(TaskbarProgress),
    ConnectionStateChanged(ConnectionState),
    WarningBell,
    TabColorChanged(Option<Rgb>),
    CursorPositionChanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    OutputReceived,
    RenderNeeded,
    ScrollPositionChanged,
    FontSizeChanged,
    TitleChanged,
    TaskbarProgressChanged,
    ConnectionStateChanged,
    WarningBell,
    TabColorChanged,
    CursorPositionChanged,
}

impl EngineEventKind {
    pub const ALL: [EngineEventKind; 10] = [
        EngineEventKind::OutputReceived,
        EngineEventKind::RenderNeeded,
        EngineEventKind::ScrollPositionChanged,
        EngineEventKind::FontSizeChanged,
        EngineEventKind::TitleChanged,
        EngineEventKind::TaskbarProgressChanged,
        EngineEventKind::ConnectionStateChanged,
        EngineEventKind::WarningBell,
        EngineEventKind::TabColorChanged,
        EngineEventKind::CursorPositionChanged,
    ];
}

impl EngineEvent {
    pub fn kind(&self) -> EngineEventKind {
        match self {
            EngineEvent::OutputReceived => EngineEventKind::OutputReceived,
            EngineEvent::RenderNeeded => EngineEventKind::RenderNeeded,
            EngineEvent::ScrollPositionChanged(_) => EngineEventKind::ScrollPositionChanged,
            EngineEvent::FontSizeChanged { .. } => EngineEventKind::FontSizeChanged,
            EngineEvent::TitleChanged(_) => EngineEventKind::TitleChanged,
            EngineEvent::TaskbarProgressChanged(_) => EngineEventKind::TaskbarProgressChanged,
            EngineEvent::ConnectionStateChanged(_) => EngineEventKind::ConnectionStateChanged,
            EngineEvent::WarningBell => EngineEventKind::WarningBell,
            EngineEvent::TabColorChanged(_) => EngineEventKind::TabColorChanged,
            EngineEvent::CursorPositionChanged => EngineEventKind::CursorPositionChanged,
        }
    }
}

/// Handle the engine uses to publish [`EngineEvent`]s. Cheap to clone, safe
/// to call from any thread, never blocks.
#[derive(Clone)]
pub struct EngineEventSink {
    emit: Arc<dyn Fn(EngineEvent) + Send + Sync>,
}

impl EngineEventSink {
    pub fn new<F>(emit: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        Self {
            emit: Arc::new(emit),
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        (self.emit)(event)
    }
}

impl fmt::Debug for EngineEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineEventSink").finish_non_exhaustive()
    }
}

/// Terminal engine collaborator. Exclusively owned by the control.
pub trait TerminalEngine: ModeQuery + Send {
    /// Starts publishing events to `sink`.
    fn subscribe(&mut self, sink: EngineEventSink);
    /// Stops publishing events. Events already in flight may still arrive.
    fn unsubscribe(&mut self);

    fn write_input(&mut self, bytes: &[u8]) -> Result<(), EngineError>;
    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), EngineError>;

    fn scroll_state(&self) -> ScrollState;
    fn scroll_viewport(&mut self, view_top: i32);

    fn title(&self) -> String {
        String::new()
    }

    fn set_selection_anchor(&mut self, position: CellPosition, mode: SelectionMode);
    fn set_selection_end(&mut self, position: CellPosition);
    fn clear_selection(&mut self);
    fn has_selection(&self) -> bool;
    fn selection_text(&self, single_line: bool) -> Option<String>;

    /// Releases the connection. Called once, from `ControlCore::close`.
    fn shutdown(&mut self) {}
}
