//! The orchestrator: owns the engine and render surface, wires engine events
//! into throttles, and turns host input into engine commands.

mod error;
mod input;
mod lifecycle;
mod router;

pub use error::{ControlError, ValidationError};
pub use lifecycle::{ClosingFlag, ControlState};
pub use router::{EventHandler, EventRouter};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::auto_scroll::{
    AutoScrollController, AutoScrollHost, AutoScrollSettings, ScrollBounds, ViewportBounds,
};
use crate::blink::BlinkController;
use crate::config::ControlSettings;
use crate::dispatch::Dispatcher;
use crate::engine::{
    CellPosition, ConnectionState, Rgb, TaskbarProgress, TerminalEngine, TerminalMode,
};
use crate::host::{ControlHost, FontSizeChange, Notice, NoticeLevel};
use crate::input::{InputTranslator, PointerPosition, ViewportCell};
use crate::scrollbar::{ScrollState, ScrollbarSync};
use crate::surface::{CellSize, RenderSurface, SurfaceFactory};
use crate::telemetry::logging::hexdump;
use crate::throttle::{ThrottleConfig, UpdateThrottle};

use input::PointerGesture;
use lifecycle::Lifecycle;

/// Consecutive clicks on the same cell within this window count as a
/// double or triple click.
pub const MULTI_CLICK_WINDOW: Duration = Duration::from_millis(500);

/// Smallest grid `minimum_size` allows.
pub const MIN_COLUMNS: u16 = 10;
pub const MIN_ROWS: u16 = 1;

const READ_ONLY_NOTICE: &str =
    "The terminal is in read-only mode. Toggle read-only mode to send input.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Width,
    Height,
}

#[derive(Clone, Copy, Debug)]
struct FontState {
    size: i32,
    cell: CellSize,
}

#[derive(Clone, Copy, Debug, Default)]
struct GridState {
    width_px: u32,
    height_px: u32,
    rows: u16,
    cols: u16,
}

#[derive(Clone, Debug, Default)]
struct EngineStatus {
    title: String,
    taskbar: TaskbarProgress,
    connection: ConnectionState,
    tab_color: Option<Rgb>,
}

/// State shared between the control, its throttled deliveries, timers and
/// the engine's event sink. Deferred work holds it through a `Weak` and
/// checks the closing flag before touching anything.
pub struct ControlShared {
    me: Weak<ControlShared>,
    dispatcher: Dispatcher,
    host: Arc<dyn ControlHost>,
    surface_factory: Arc<dyn SurfaceFactory>,
    lifecycle: Lifecycle,
    settings: RwLock<Arc<ControlSettings>>,
    engine: Mutex<Option<Box<dyn TerminalEngine>>>,
    surface: Mutex<Option<Box<dyn RenderSurface>>>,
    translator: RwLock<InputTranslator>,
    router: RwLock<EventRouter>,
    redraw: UpdateThrottle<()>,
    cursor_moved: UpdateThrottle<()>,
    title: UpdateThrottle<String>,
    output_activity: UpdateThrottle<u64>,
    scrollbar: ScrollbarSync,
    blink: BlinkController,
    auto_scroll: AutoScrollController,
    font: Mutex<FontState>,
    grid: Mutex<GridState>,
    gesture: Mutex<PointerGesture>,
    status: Mutex<EngineStatus>,
    read_only: AtomicBool,
    focused: AtomicBool,
}

/// A terminal control. Host-facing calls are expected on the delivery
/// context; the engine may publish events from any thread.
pub struct ControlCore {
    shared: Arc<ControlShared>,
}

impl ControlCore {
    pub fn new<F>(dispatcher: Dispatcher, surface_factory: F, host: Arc<dyn ControlHost>) -> Self
    where
        F: SurfaceFactory + 'static,
    {
        let defaults = ControlSettings::default();
        let shared = Arc::new_cyclic(|me: &Weak<ControlShared>| {
            let blink_target = me.clone();
            let scroll_host: Weak<dyn AutoScrollHost> = me.clone();
            ControlShared {
                me: me.clone(),
                dispatcher: dispatcher.clone(),
                host,
                surface_factory: Arc::new(surface_factory),
                lifecycle: Lifecycle::new(),
                redraw: UpdateThrottle::latest(
                    "redraw",
                    dispatcher.clone(),
                    ThrottleConfig::trailing(defaults.redraw_interval()),
                ),
                cursor_moved: UpdateThrottle::latest(
                    "cursor-moved",
                    dispatcher.clone(),
                    ThrottleConfig::trailing(defaults.redraw_interval()),
                ),
                title: UpdateThrottle::latest(
                    "title",
                    dispatcher.clone(),
                    ThrottleConfig::trailing(defaults.title_interval()),
                ),
                output_activity: UpdateThrottle::accumulating(
                    "output-activity",
                    dispatcher.clone(),
                    ThrottleConfig::trailing(defaults.output_activity_interval()),
                ),
                scrollbar: ScrollbarSync::new(
                    dispatcher.clone(),
                    ThrottleConfig::trailing(defaults.scrollbar_interval()),
                ),
                blink: BlinkController::new(
                    dispatcher.clone(),
                    defaults.cursor_blink,
                    defaults.cursor_blink_interval(),
                    move |visible| {
                        if let Some(shared) = blink_target.upgrade() {
                            shared.cursor_visibility_changed(visible);
                        }
                    },
                ),
                auto_scroll: AutoScrollController::new(
                    dispatcher.clone(),
                    AutoScrollSettings::from_settings(&defaults),
                    scroll_host,
                ),
                font: Mutex::new(FontState {
                    size: defaults.font_size,
                    cell: CellSize::new(0.0, 0.0),
                }),
                settings: RwLock::new(Arc::new(defaults)),
                engine: Mutex::new(None),
                surface: Mutex::new(None),
                translator: RwLock::new(InputTranslator::default()),
                router: RwLock::new(EventRouter::new()),
                grid: Mutex::new(GridState::default()),
                gesture: Mutex::new(PointerGesture::default()),
                status: Mutex::new(EngineStatus::default()),
                read_only: AtomicBool::new(false),
                focused: AtomicBool::new(false),
            }
        });
        Self { shared }
    }

    pub fn state(&self) -> ControlState {
        self.shared.lifecycle.state()
    }

    pub fn is_closing(&self) -> bool {
        self.shared.is_closing()
    }

    /// Shareable view of the closing flag for code running off the
    /// delivery context.
    pub fn closing_flag(&self) -> ClosingFlag {
        self.shared.lifecycle.closing_flag()
    }

    pub fn settings(&self) -> Arc<ControlSettings> {
        self.shared.settings()
    }

    /// Re-applies configuration without touching the engine connection.
    pub fn update_settings(&self, settings: ControlSettings) -> Result<(), ControlError> {
        let shared = &self.shared;
        shared.lifecycle.ensure_initialized()?;
        settings.validate()?;
        let translator = InputTranslator::from_settings(&settings)?;
        let previous = shared.settings();

        shared.apply_intervals(&settings);
        shared.blink.set_interval(settings.cursor_blink_interval());
        if settings.cursor_blink != previous.cursor_blink {
            shared.blink.set_blink_enabled(settings.cursor_blink);
        }
        shared
            .auto_scroll
            .set_settings(AutoScrollSettings::from_settings(&settings));
        *shared.translator.write() = translator;
        let font_size = settings.font_size;
        let padding_changed = settings.padding != previous.padding;
        *shared.settings.write() = Arc::new(settings);

        if font_size != previous.font_size {
            shared.apply_font_size(font_size, false)?;
        } else if padding_changed {
            shared.relayout()?;
        }
        shared.redraw.submit(());
        debug!(target = "control::lifecycle", "settings updated");
        Ok(())
    }

    /// New surface size in pixels. Recomputes the grid and resizes the
    /// engine.
    pub fn resize(&self, width_px: u32, height_px: u32) -> Result<(), ControlError> {
        let shared = &self.shared;
        shared.lifecycle.ensure_initialized()?;
        if width_px == 0 || height_px == 0 {
            return Err(ValidationError::InvalidSize {
                width: width_px,
                height: height_px,
            }
            .into());
        }
        {
            let mut grid = shared.grid.lock();
            grid.width_px = width_px;
            grid.height_px = height_px;
        }
        shared.relayout()
    }

    /// Scrolls so `view_top` is the first visible row. Out-of-range rows
    /// are clamped; returns the row actually shown.
    pub fn scroll_viewport(&self, view_top: i32) -> Result<i32, ControlError> {
        self.shared.lifecycle.ensure_initialized()?;
        Ok(self.shared.scroll_to(view_top))
    }

    pub fn scroll_offset(&self) -> i32 {
        self.shared.scrollbar.state().view_top
    }

    pub fn view_height(&self) -> i32 {
        self.shared.scrollbar.state().view_height
    }

    pub fn scroll_state(&self) -> ScrollState {
        self.shared.scrollbar.state()
    }

    /// Moved by the host scrollbar. Echoes of our own updates are dropped.
    pub fn host_scrollbar_changed(&self, value: f64) {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return;
        }
        if let Some(row) = shared.scrollbar.host_value_changed(value) {
            trace!(target = "control::input", row, "scrollbar moved by user");
            shared.with_engine(|engine| engine.scroll_viewport(row));
            shared.redraw.submit(());
        }
    }

    pub fn adjust_font_size(&self, delta: i32) -> Result<(), ControlError> {
        self.shared.adjust_font_size(delta)
    }

    pub fn reset_font_size(&self) -> Result<(), ControlError> {
        let shared = &self.shared;
        shared.lifecycle.ensure_initialized()?;
        let size = shared.settings().font_size;
        shared.apply_font_size(size, false)
    }

    pub fn font_size(&self) -> i32 {
        self.shared.font.lock().size
    }

    pub fn character_dimensions(&self) -> CellSize {
        self.shared.font.lock().cell
    }

    /// Grid size in (rows, cols).
    pub fn grid_size(&self) -> (u16, u16) {
        let grid = self.shared.grid.lock();
        (grid.rows, grid.cols)
    }

    /// Rounds `dimension` down to a whole number of cells, keeping the
    /// padding.
    pub fn snap_dimension_to_grid(&self, axis: Axis, dimension: f32) -> f32 {
        let cell = self.character_dimensions();
        let padding = self.shared.settings().padding * 2.0;
        let cell_extent = match axis {
            Axis::Width => cell.width,
            Axis::Height => cell.height,
        };
        if cell_extent <= 0.0 {
            return dimension;
        }
        let cells = ((dimension - padding) / cell_extent).floor().max(1.0);
        cells * cell_extent + padding
    }

    /// Smallest surface size, in pixels, that still fits the minimum grid.
    pub fn minimum_size(&self) -> (f32, f32) {
        let cell = self.character_dimensions();
        let padding = self.shared.settings().padding * 2.0;
        (
            cell.width * f32::from(MIN_COLUMNS) + padding,
            cell.height * f32::from(MIN_ROWS) + padding,
        )
    }

    /// Writes raw text to the engine. Blocked in read-only mode.
    pub fn send_input(&self, text: &str) -> bool {
        if self.shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        self.shared.send_bytes(text.as_bytes(), "send_input")
    }

    /// Pastes text, normalising line endings to CR and honouring bracketed
    /// paste mode.
    pub fn paste_text(&self, text: &str) -> bool {
        let shared = &self.shared;
        if shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        let bracketed = shared
            .with_engine(|engine| engine.get_mode(TerminalMode::BracketedPaste))
            .unwrap_or(false);
        let bytes = paste_bytes(text, bracketed);
        shared.send_bytes(&bytes, "paste")
    }

    /// Hands the selected text to the host clipboard and clears the
    /// selection. Returns false when nothing is selected.
    pub fn copy_selection_to_clipboard(&self, single_line: bool) -> bool {
        if self.shared.lifecycle.ensure_initialized().is_err() {
            return false;
        }
        self.shared.copy_selection(single_line, true)
    }

    pub fn toggle_read_only(&self) {
        self.shared.toggle_read_only();
    }

    pub fn read_only(&self) -> bool {
        self.shared.read_only.load(Ordering::Acquire)
    }

    pub fn is_focused(&self) -> bool {
        self.shared.focused.load(Ordering::Acquire)
    }

    pub fn cursor_visible(&self) -> bool {
        self.shared.blink.is_visible()
    }

    pub fn title(&self) -> String {
        self.shared.status.lock().title.clone()
    }

    pub fn taskbar_progress(&self) -> TaskbarProgress {
        self.shared.status.lock().taskbar
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.status.lock().connection
    }

    pub fn tab_color(&self) -> Option<Rgb> {
        self.shared.status.lock().tab_color
    }

    /// Number of engine event kinds currently routed.
    pub fn routed_event_kinds(&self) -> usize {
        self.shared.router.read().len()
    }
}

impl Drop for ControlCore {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) fn paste_bytes(text: &str, bracketed: bool) -> Vec<u8> {
    let normalized = text.replace("\r\n", "\r").replace('\n', "\r");
    let mut bytes = Vec::with_capacity(normalized.len() + 12);
    if bracketed {
        bytes.extend_from_slice(b"\x1b[200~");
    }
    bytes.extend_from_slice(normalized.as_bytes());
    if bracketed {
        bytes.extend_from_slice(b"\x1b[201~");
    }
    bytes
}

impl ControlShared {
    fn is_closing(&self) -> bool {
        self.lifecycle.is_closing()
    }

    fn settings(&self) -> Arc<ControlSettings> {
        Arc::clone(&self.settings.read())
    }

    fn with_engine<R>(&self, f: impl FnOnce(&mut dyn TerminalEngine) -> R) -> Option<R> {
        let mut engine = self.engine.lock();
        engine.as_mut().map(|engine| f(engine.as_mut()))
    }

    fn with_surface<R>(&self, f: impl FnOnce(&mut dyn RenderSurface) -> R) -> Option<R> {
        let mut surface = self.surface.lock();
        surface.as_mut().map(|surface| f(surface.as_mut()))
    }

    /// Runs `f` on the delivery context unless the control starts closing
    /// first.
    fn post<F>(&self, f: F)
    where
        F: FnOnce(&ControlShared) + Send + 'static,
    {
        let me = self.me.clone();
        self.dispatcher.post(move || {
            let Some(shared) = me.upgrade() else {
                return;
            };
            if shared.is_closing() {
                trace!(target = "control::router", "posted work dropped after close");
                return;
            }
            f(&shared);
        });
    }

    fn apply_intervals(&self, settings: &ControlSettings) {
        self.redraw.set_interval(settings.redraw_interval());
        self.cursor_moved.set_interval(settings.redraw_interval());
        self.title.set_interval(settings.title_interval());
        self.output_activity
            .set_interval(settings.output_activity_interval());
        self.scrollbar
            .throttle()
            .set_interval(settings.scrollbar_interval());
    }

    fn cursor_visibility_changed(&self, visible: bool) {
        if self.is_closing() {
            return;
        }
        self.with_surface(|surface| surface.set_cursor_visible(visible));
        self.host.on_cursor_visibility(visible);
    }

    fn notice(&self, level: NoticeLevel, message: &str) {
        self.host.on_notice(Notice {
            level,
            message: message.to_string(),
        });
    }

    /// Writes user-originated bytes. Read-only mode blocks them and raises
    /// a notice instead.
    fn send_bytes(&self, bytes: &[u8], origin: &'static str) -> bool {
        if bytes.is_empty() {
            return false;
        }
        if self.read_only.load(Ordering::Acquire) {
            debug!(target = "control::input", origin, "input blocked by read-only mode");
            self.notice(NoticeLevel::Info, READ_ONLY_NOTICE);
            return false;
        }
        self.write_engine(bytes, origin)
    }

    /// Writes bytes regardless of read-only mode.
    fn write_engine(&self, bytes: &[u8], origin: &'static str) -> bool {
        trace!(
            target = "control::input",
            origin,
            len = bytes.len(),
            bytes = %hexdump(bytes),
            "writing to engine"
        );
        match self.with_engine(|engine| engine.write_input(bytes)) {
            Some(Ok(())) => true,
            Some(Err(err)) => {
                warn!(target = "control::input", origin, error = %err, "engine rejected input");
                false
            }
            None => false,
        }
    }

    /// Locally originated scroll: clamps, moves the engine viewport and
    /// refreshes the host scrollbar.
    fn scroll_to(&self, view_top: i32) -> i32 {
        let row = self.scrollbar.set_view_top(view_top);
        self.with_engine(|engine| engine.scroll_viewport(row));
        self.scrollbar.engine_changed(self.scrollbar.state());
        self.redraw.submit(());
        row
    }

    fn scroll_by(&self, rows: i32) -> i32 {
        let top = self.scrollbar.state().view_top;
        self.scroll_to(top.saturating_add(rows))
    }

    fn scroll_to_bottom(&self) {
        let state = self.scrollbar.state();
        if !state.is_at_bottom() {
            self.scroll_to(state.maximum());
        }
    }

    fn adjust_font_size(&self, delta: i32) -> Result<(), ControlError> {
        self.lifecycle.ensure_initialized()?;
        let current = self.font.lock().size;
        let next = current.saturating_add(delta);
        if next <= 0 {
            return Err(ValidationError::InvalidFontSize(next).into());
        }
        self.apply_font_size(next, false)
    }

    fn apply_font_size(&self, size: i32, is_initial: bool) -> Result<(), ControlError> {
        if size <= 0 {
            return Err(ValidationError::InvalidFontSize(size).into());
        }
        let cell = self
            .with_surface(|surface| surface.set_font_size(size))
            .ok_or(ControlError::Closed)??;
        *self.font.lock() = FontState { size, cell };
        debug!(target = "control::lifecycle", size, width = cell.width, height = cell.height, "font size applied");
        self.host.on_font_size_changed(FontSizeChange {
            width: cell.width.round() as u32,
            height: cell.height.round() as u32,
            is_initial,
        });
        self.relayout()
    }

    /// Recomputes rows and columns from the pixel size and cell size, then
    /// resizes the surface and engine.
    fn relayout(&self) -> Result<(), ControlError> {
        let cell = self.font.lock().cell;
        let padding = self.settings().padding;
        let (width_px, height_px, rows, cols) = {
            let mut grid = self.grid.lock();
            if grid.width_px == 0 || grid.height_px == 0 {
                return Ok(());
            }
            grid.cols = cells_for(grid.width_px, padding, cell.width);
            grid.rows = cells_for(grid.height_px, padding, cell.height);
            (grid.width_px, grid.height_px, grid.rows, grid.cols)
        };
        self.with_surface(|surface| surface.resize(width_px, height_px))
            .transpose()?;
        self.with_engine(|engine| engine.resize(rows, cols))
            .transpose()?;
        if let Some(state) = self.with_engine(|engine| engine.scroll_state()) {
            self.scrollbar.set_state(state);
            self.scrollbar.engine_changed(state);
        }
        debug!(target = "control::lifecycle", rows, cols, width_px, height_px, "grid resized");
        self.redraw.submit(());
        Ok(())
    }

    fn viewport_bounds(&self) -> ViewportBounds {
        let grid = self.grid.lock();
        ViewportBounds::new(0.0, f64::from(grid.height_px))
    }

    fn cell_at(&self, position: PointerPosition) -> (f64, f64, u16, u16) {
        let cell = self.font.lock().cell;
        let padding = f64::from(self.settings().padding);
        let grid = *self.grid.lock();
        let col = if cell.width > 0.0 {
            ((position.x - padding) / f64::from(cell.width)).floor()
        } else {
            0.0
        };
        let row = if cell.height > 0.0 {
            ((position.y - padding) / f64::from(cell.height)).floor()
        } else {
            0.0
        };
        (row, col, grid.rows, grid.cols)
    }

    /// Visible cell under the pointer, or `None` outside the grid.
    fn viewport_cell(&self, position: PointerPosition) -> Option<ViewportCell> {
        let (row, col, rows, cols) = self.cell_at(position);
        let inside = row >= 0.0 && col >= 0.0 && row < f64::from(rows) && col < f64::from(cols);
        inside.then(|| ViewportCell {
            row: row as u16,
            col: col as u16,
        })
    }

    /// Buffer position under the pointer, clamped into the viewport.
    fn buffer_position(&self, position: PointerPosition) -> CellPosition {
        let (row, col, rows, cols) = self.cell_at(position);
        let row = row.clamp(0.0, f64::from(rows.saturating_sub(1))) as i32;
        let col = col.clamp(0.0, f64::from(cols.saturating_sub(1))) as i32;
        CellPosition::new(self.scrollbar.state().view_top + row, col)
    }

    fn copy_selection(&self, single_line: bool, clear: bool) -> bool {
        let text = self
            .with_engine(|engine| engine.selection_text(single_line))
            .flatten()
            .filter(|text| !text.is_empty());
        let Some(text) = text else {
            return false;
        };
        if clear {
            self.with_engine(|engine| engine.clear_selection());
            self.redraw.submit(());
        }
        debug!(target = "control::input", len = text.len(), single_line, "copying selection");
        self.host.on_copy_to_clipboard(text);
        true
    }

    fn toggle_read_only(&self) {
        if self.lifecycle.ensure_initialized().is_err() {
            return;
        }
        let read_only = !self.read_only.fetch_xor(true, Ordering::AcqRel);
        debug!(target = "control::input", read_only, "read-only toggled");
        self.blink.set_read_only(read_only);
        self.host.on_read_only_changed(read_only);
    }
}

fn cells_for(pixels: u32, padding: f32, cell_extent: f32) -> u16 {
    if cell_extent <= 0.0 {
        return 1;
    }
    let usable = pixels as f32 - padding * 2.0;
    (usable / cell_extent).floor().clamp(1.0, f32::from(u16::MAX)) as u16
}

impl AutoScrollHost for ControlShared {
    fn scroll_bounds(&self) -> Option<ScrollBounds> {
        if self.is_closing() {
            return None;
        }
        let state = self.scrollbar.state();
        Some(ScrollBounds {
            value: state.view_top,
            min: state.minimum(),
            max: state.maximum(),
        })
    }

    fn apply_auto_scroll(&self, view_top: i32, pointer: PointerPosition) {
        if self.is_closing() {
            return;
        }
        self.scroll_to(view_top);
        let position = self.buffer_position(pointer);
        self.with_engine(|engine| engine.set_selection_end(position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paste_normalises_newlines() {
        assert_eq!(paste_bytes("a\r\nb\nc", false), b"a\rb\rc".to_vec());
        assert_eq!(paste_bytes("ls\n", true), b"\x1b[200~ls\r\x1b[201~".to_vec());
    }

    #[test]
    fn grid_dimension_accounts_for_padding() {
        assert_eq!(cells_for(816, 8.0, 10.0), 80);
        assert_eq!(cells_for(10, 8.0, 10.0), 1, "never below one cell");
        assert_eq!(cells_for(100, 0.0, 0.0), 1);
    }
}
