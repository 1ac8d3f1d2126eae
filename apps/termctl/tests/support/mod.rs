#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use termctl_core::config::ControlSettings;
use termctl_core::control::ControlCore;
use termctl_core::dispatch::Dispatcher;
use termctl_core::engine::{
    CellPosition, ConnectionState, EngineError, EngineEvent, EngineEventSink, ModeQuery, Rgb,
    SelectionMode, TaskbarProgress, TerminalEngine, TerminalMode,
};
use termctl_core::host::{ControlHost, FontSizeChange, Notice};
use termctl_core::scrollbar::{ScrollState, ScrollbarUpdate};
use termctl_core::surface::{CellSize, RenderSurface, SurfaceError, SurfaceFactory};

#[derive(Debug, Default)]
pub struct EngineLog {
    pub sink: Option<EngineEventSink>,
    pub modes: HashSet<TerminalMode>,
    pub writes: Vec<Vec<u8>>,
    pub resizes: Vec<(u16, u16)>,
    pub scrolls: Vec<i32>,
    pub scroll: ScrollState,
    pub anchor: Option<(CellPosition, SelectionMode)>,
    pub selection_end: Option<CellPosition>,
    pub selection_text: Option<String>,
    pub unsubscribed: bool,
    pub shut_down: bool,
}

/// Engine whose every call lands in a shared log the test keeps a handle to.
pub struct RecordingEngine {
    log: Arc<Mutex<EngineLog>>,
}

#[derive(Clone)]
pub struct EngineProbe {
    log: Arc<Mutex<EngineLog>>,
}

impl RecordingEngine {
    pub fn new(scroll: ScrollState) -> (Self, EngineProbe) {
        let log = Arc::new(Mutex::new(EngineLog {
            scroll,
            ..EngineLog::default()
        }));
        (
            Self {
                log: Arc::clone(&log),
            },
            EngineProbe { log },
        )
    }
}

impl EngineProbe {
    pub fn emit(&self, event: EngineEvent) {
        let sink = self.log.lock().sink.clone();
        if let Some(sink) = sink {
            sink.emit(event);
        }
    }

    pub fn sink(&self) -> Option<EngineEventSink> {
        self.log.lock().sink.clone()
    }

    pub fn set_mode(&self, mode: TerminalMode, on: bool) {
        let mut log = self.log.lock();
        if on {
            log.modes.insert(mode);
        } else {
            log.modes.remove(&mode);
        }
    }

    pub fn set_scroll(&self, scroll: ScrollState) {
        self.log.lock().scroll = scroll;
    }

    pub fn set_selection(&self, text: &str) {
        let mut log = self.log.lock();
        log.anchor = Some((CellPosition::new(0, 0), SelectionMode::Cell));
        log.selection_text = Some(text.to_string());
    }

    pub fn written(&self) -> Vec<u8> {
        self.log.lock().writes.concat()
    }

    pub fn write_count(&self) -> usize {
        self.log.lock().writes.len()
    }

    pub fn with<R>(&self, f: impl FnOnce(&EngineLog) -> R) -> R {
        f(&self.log.lock())
    }
}

impl ModeQuery for RecordingEngine {
    fn get_mode(&self, mode: TerminalMode) -> bool {
        self.log.lock().modes.contains(&mode)
    }
}

impl TerminalEngine for RecordingEngine {
    fn subscribe(&mut self, sink: EngineEventSink) {
        self.log.lock().sink = Some(sink);
    }

    fn unsubscribe(&mut self) {
        let mut log = self.log.lock();
        log.sink = None;
        log.unsubscribed = true;
    }

    fn write_input(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.log.lock().writes.push(bytes.to_vec());
        Ok(())
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Result<(), EngineError> {
        let mut log = self.log.lock();
        log.resizes.push((rows, cols));
        log.scroll.view_height = i32::from(rows);
        log.scroll = log.scroll.clamped();
        Ok(())
    }

    fn scroll_state(&self) -> ScrollState {
        self.log.lock().scroll
    }

    fn scroll_viewport(&mut self, view_top: i32) {
        let mut log = self.log.lock();
        log.scrolls.push(view_top);
        log.scroll = log.scroll.with_view_top(view_top);
    }

    fn set_selection_anchor(&mut self, position: CellPosition, mode: SelectionMode) {
        let mut log = self.log.lock();
        log.anchor = Some((position, mode));
        log.selection_end = Some(position);
    }

    fn set_selection_end(&mut self, position: CellPosition) {
        let mut log = self.log.lock();
        if log.anchor.is_some() {
            log.selection_end = Some(position);
        }
    }

    fn clear_selection(&mut self) {
        let mut log = self.log.lock();
        log.anchor = None;
        log.selection_end = None;
        log.selection_text = None;
    }

    fn has_selection(&self) -> bool {
        self.log.lock().anchor.is_some()
    }

    fn selection_text(&self, single_line: bool) -> Option<String> {
        let log = self.log.lock();
        log.anchor?;
        let text = log.selection_text.clone().unwrap_or_else(|| "selected".to_string());
        Some(if single_line {
            text.replace('\n', " ")
        } else {
            text
        })
    }

    fn shutdown(&mut self) {
        self.log.lock().shut_down = true;
    }
}

#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub created: usize,
    pub invalidations: usize,
    pub resizes: Vec<(u32, u32)>,
    pub font_sizes: Vec<i32>,
    pub cursor_visible: Option<bool>,
    pub dropped: usize,
}

/// Cells are half the font size wide and exactly the font size tall.
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
    cell: CellSize,
}

impl RenderSurface for RecordingSurface {
    fn invalidate(&mut self) {
        self.log.lock().invalidations += 1;
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.log.lock().resizes.push((width, height));
        Ok(())
    }

    fn set_font_size(&mut self, font_size: i32) -> Result<CellSize, SurfaceError> {
        self.log.lock().font_sizes.push(font_size);
        let size = font_size as f32;
        self.cell = CellSize::new(size / 2.0, size);
        Ok(self.cell)
    }

    fn cell_size(&self) -> CellSize {
        self.cell
    }

    fn set_cursor_visible(&mut self, visible: bool) {
        self.log.lock().cursor_visible = Some(visible);
    }
}

impl Drop for RecordingSurface {
    fn drop(&mut self) {
        self.log.lock().dropped += 1;
    }
}

#[derive(Clone, Default)]
pub struct RecordingFactory {
    pub log: Arc<Mutex<SurfaceLog>>,
    pub fail: bool,
}

impl RecordingFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn invalidations(&self) -> usize {
        self.log.lock().invalidations
    }
}

impl SurfaceFactory for RecordingFactory {
    fn create(&self, _settings: &ControlSettings) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        if self.fail {
            return Err(SurfaceError::Unavailable("no adapter".into()));
        }
        self.log.lock().created += 1;
        Ok(Box::new(RecordingSurface {
            log: Arc::clone(&self.log),
            cell: CellSize::new(0.0, 0.0),
        }))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    Initialized,
    Scrollbar(ScrollbarUpdate),
    Title(String),
    FontSize(FontSizeChange),
    CursorVisible(bool),
    Taskbar(TaskbarProgress),
    Connection(ConnectionState),
    TabColor(Option<Rgb>),
    Bell,
    Output(u64),
    Copy(String),
    PasteRequested,
    ReadOnly(bool),
    Notice(Notice),
}

type ScrollbarEcho = Box<dyn Fn(f64) + Send + Sync>;

#[derive(Default)]
pub struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
    echo: Mutex<Option<ScrollbarEcho>>,
    echoes: AtomicUsize,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| pred(call)).count()
    }

    pub fn scrollbar_updates(&self) -> Vec<ScrollbarUpdate> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Scrollbar(update) => Some(*update),
                _ => None,
            })
            .collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::Title(title) => Some(title.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    /// Feeds every scrollbar update straight back into the control, the way
    /// a real scrollbar widget raises its value-changed event.
    pub fn echo_scrollbar_into(&self, control: Weak<ControlCore>) {
        *self.echo.lock() = Some(Box::new(move |value| {
            if let Some(control) = control.upgrade() {
                control.host_scrollbar_changed(value);
            }
        }));
    }

    pub fn echoes(&self) -> usize {
        self.echoes.load(Ordering::SeqCst)
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }
}

impl ControlHost for RecordingHost {
    fn on_initialized(&self) {
        self.record(HostCall::Initialized);
    }

    fn on_scrollbar_update(&self, update: ScrollbarUpdate) {
        self.record(HostCall::Scrollbar(update));
        let echo = self.echo.lock();
        if let Some(echo) = echo.as_ref() {
            self.echoes.fetch_add(1, Ordering::SeqCst);
            echo(update.value);
        }
    }

    fn on_title_changed(&self, title: &str) {
        self.record(HostCall::Title(title.to_string()));
    }

    fn on_font_size_changed(&self, change: FontSizeChange) {
        self.record(HostCall::FontSize(change));
    }

    fn on_cursor_visibility(&self, visible: bool) {
        self.record(HostCall::CursorVisible(visible));
    }

    fn on_taskbar_progress(&self, progress: TaskbarProgress) {
        self.record(HostCall::Taskbar(progress));
    }

    fn on_connection_state(&self, state: ConnectionState) {
        self.record(HostCall::Connection(state));
    }

    fn on_tab_color_changed(&self, color: Option<Rgb>) {
        self.record(HostCall::TabColor(color));
    }

    fn on_warning_bell(&self) {
        self.record(HostCall::Bell);
    }

    fn on_output_activity(&self, chunks: u64) {
        self.record(HostCall::Output(chunks));
    }

    fn on_copy_to_clipboard(&self, text: String) {
        self.record(HostCall::Copy(text));
    }

    fn on_paste_requested(&self) {
        self.record(HostCall::PasteRequested);
    }

    fn on_read_only_changed(&self, read_only: bool) {
        self.record(HostCall::ReadOnly(read_only));
    }

    fn on_notice(&self, notice: Notice) {
        self.record(HostCall::Notice(notice));
    }
}

/// Settings with the blink timer off so paused-clock tests stay quiet.
pub fn quiet_settings() -> ControlSettings {
    ControlSettings {
        cursor_blink: false,
        ..ControlSettings::default()
    }
}

pub struct Harness {
    pub control: Arc<ControlCore>,
    pub engine: EngineProbe,
    pub surface: RecordingFactory,
    pub host: Arc<RecordingHost>,
}

impl Harness {
    /// A control on the current runtime, not yet initialized.
    pub fn new(scroll: ScrollState) -> (Self, RecordingEngine) {
        let (engine, probe) = RecordingEngine::new(scroll);
        let surface = RecordingFactory::default();
        let host = Arc::new(RecordingHost::default());
        let control = Arc::new(ControlCore::new(
            Dispatcher::current(),
            surface.clone(),
            host.clone(),
        ));
        (
            Self {
                control,
                engine: probe,
                surface,
                host,
            },
            engine,
        )
    }

    /// Initialized with `settings` and sized to 40 columns by 20 rows at the
    /// default 12pt font (6x12 cells, 8px padding).
    pub async fn started(scroll: ScrollState, settings: ControlSettings) -> Self {
        let (harness, engine) = Self::new(scroll);
        harness
            .control
            .initialize(settings, Box::new(engine))
            .expect("initialize");
        harness
            .control
            .resize(40 * 6 + 16, 20 * 12 + 16)
            .expect("resize");
        settle().await;
        harness
    }
}

/// Lets every pending throttle window and posted callback run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(600)).await;
}
