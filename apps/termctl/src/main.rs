use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser};
use crossterm::event::{KeyCode, KeyModifiers};
use parking_lot::Mutex;
use termctl_core::config::ControlSettings;
use termctl_core::control::ControlCore;
use termctl_core::dispatch::Dispatcher;
use termctl_core::engine::{
    CellPosition, EngineError, EngineEvent, EngineEventSink, ModeQuery, SelectionMode,
    TerminalEngine, TerminalMode,
};
use termctl_core::host::{ControlHost, FontSizeChange, Notice};
use termctl_core::input::KeyInput;
use termctl_core::persistence::{PersistedState, PersistedTab};
use termctl_core::scrollbar::{ScrollState, ScrollbarUpdate};
use termctl_core::surface::{CellSize, RenderSurface, SurfaceError, SurfaceFactory};
use termctl_core::telemetry::logging::{self as logctl, LogConfig, LogLevel};
use tracing::{debug, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("❌ {err:#}");
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "termctl-demo",
    about = "Drive a terminal control with a synthetic engine and report what the host saw",
    version
)]
struct Cli {
    #[arg(long, value_name = "PATH", help = "TOML settings file")]
    config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Tab state file; the demo records its tab here"
    )]
    state: Option<PathBuf>,

    #[arg(long, default_value_t = 1000, help = "How long the engine floods events")]
    duration_ms: u64,

    #[arg(long, default_value_t = 200, help = "Events per engine batch")]
    burst: u32,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "TERMCTL_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "TERMCTL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    file: Option<PathBuf>,
}

impl LoggingArgs {
    fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_config = cli.logging.to_config();
    logctl::init(&log_config)?;
    debug!(target = "demo", log_level = ?log_config.level, log_file = ?log_config.file, "logging configured");

    let settings = match cli.config.as_deref() {
        Some(path) => ControlSettings::load(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => {
            let mut settings = ControlSettings::default();
            settings.apply_env_overrides();
            settings.validate()?;
            settings
        }
    };

    let host = Arc::new(CountingHost::default());
    let engine = SyntheticEngine::new(cli.burst.max(1));
    let written = Arc::clone(&engine.written);

    let control = ControlCore::new(Dispatcher::current(), HeadlessFactory, host.clone());
    control.initialize(settings, Box::new(engine))?;
    control.resize(816, 616)?;
    control.focus_changed(true);
    info!(target = "demo", grid = ?control.grid_size(), "control ready");

    control.send_input("echo flood\r");
    control.paste_text("first line\nsecond line\n");
    control.handle_key(&KeyInput::down(
        KeyCode::PageUp,
        KeyModifiers::CONTROL | KeyModifiers::SHIFT,
    ));
    control.adjust_font_size(2)?;

    tokio::time::sleep(Duration::from_millis(cli.duration_ms)).await;
    control.scroll_viewport(0)?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let grid = control.grid_size();
    control.close();

    if let Some(path) = cli.state.as_deref() {
        let mut state = PersistedState::load(path)?;
        state.tabs.push(PersistedTab {
            profile: "termctl-demo".to_string(),
        });
        state.save(path)?;
        info!(target = "demo", path = %path.display(), tabs = state.tabs.len(), "tab state saved");
    }

    println!("grid                 {} rows x {} cols", grid.0, grid.1);
    println!(
        "output activity      {} chunks in {} deliveries",
        host.output_chunks.load(Ordering::Relaxed),
        host.output_deliveries.load(Ordering::Relaxed)
    );
    println!("scrollbar updates    {}", host.scrollbar_updates.load(Ordering::Relaxed));
    println!(
        "title updates        {} (last: {:?})",
        host.title_updates.load(Ordering::Relaxed),
        host.last_title.lock()
    );
    println!("font size changes    {}", host.font_changes.load(Ordering::Relaxed));
    println!("bytes to engine      {}", written.load(Ordering::Relaxed));
    Ok(())
}

struct HeadlessFactory;

impl SurfaceFactory for HeadlessFactory {
    fn create(&self, _settings: &ControlSettings) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        Ok(Box::new(HeadlessSurface::default()))
    }
}

/// Surface that only tracks what a renderer would have been asked to do.
#[derive(Default)]
struct HeadlessSurface {
    cell: Option<CellSize>,
    frames: u64,
}

impl RenderSurface for HeadlessSurface {
    fn invalidate(&mut self) {
        self.frames += 1;
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        if width == 0 || height == 0 {
            return Err(SurfaceError::InvalidSize { width, height });
        }
        Ok(())
    }

    fn set_font_size(&mut self, font_size: i32) -> Result<CellSize, SurfaceError> {
        let size = font_size as f32;
        let cell = CellSize::new((size * 0.6).round(), (size * 1.25).round());
        self.cell = Some(cell);
        Ok(cell)
    }

    fn cell_size(&self) -> CellSize {
        self.cell.unwrap_or(CellSize::new(0.0, 0.0))
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        debug!(target = "demo", frames = self.frames, "headless surface dropped");
    }
}

#[derive(Default)]
struct CountingHost {
    scrollbar_updates: AtomicU64,
    title_updates: AtomicU64,
    output_chunks: AtomicU64,
    output_deliveries: AtomicU64,
    font_changes: AtomicU64,
    last_title: Mutex<String>,
}

impl ControlHost for CountingHost {
    fn on_scrollbar_update(&self, _update: ScrollbarUpdate) {
        self.scrollbar_updates.fetch_add(1, Ordering::Relaxed);
    }

    fn on_title_changed(&self, title: &str) {
        self.title_updates.fetch_add(1, Ordering::Relaxed);
        *self.last_title.lock() = title.to_string();
    }

    fn on_font_size_changed(&self, change: FontSizeChange) {
        debug!(target = "demo", width = change.width, height = change.height, initial = change.is_initial, "font size changed");
        self.font_changes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_output_activity(&self, chunks: u64) {
        self.output_chunks.fetch_add(chunks, Ordering::Relaxed);
        self.output_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_notice(&self, notice: Notice) {
        info!(target = "demo", level = ?notice.level, message = %notice.message, "notice");
    }
}

/// Engine stand-in: a worker thread floods events in batches while the
/// control is subscribed.
struct SyntheticEngine {
    burst: u32,
    modes: HashSet<TerminalMode>,
    scroll: Arc<Mutex<ScrollState>>,
    written: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    selection: Option<(CellPosition, CellPosition)>,
}

impl SyntheticEngine {
    fn new(burst: u32) -> Self {
        Self {
            burst,
            modes: HashSet::from([TerminalMode::BracketedPaste, TerminalMode::FocusEvents]),
            scroll: Arc::new(Mutex::new(ScrollState::new(0, 24, 24))),
            written: Arc::new(AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            selection: None,
        }
    }

    fn stop_worker(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl ModeQuery for SyntheticEngine {
    fn get_mode(&self, mode: TerminalMode) -> bool {
        self.modes.contains(&mode)
    }
}

impl TerminalEngine for SyntheticEngine {
    fn subscribe(&mut self, sink: EngineEventSink) {
        self.stop_worker();
        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let scroll = Arc::clone(&self.scroll);
        let burst = self.burst;
        let spawned = thread::Builder::new()
            .name("synthetic-engine".into())
            .spawn(move || {
                let mut batch = 0u64;
                while running.load(Ordering::Acquire) {
                    for _ in 0..burst {
                        sink.emit(EngineEvent::OutputReceived);
                        sink.emit(EngineEvent::RenderNeeded);
                        sink.emit(EngineEvent::CursorPositionChanged);
                    }
                    let state = {
                        let mut scroll = scroll.lock();
                        let follow = scroll.is_at_bottom();
                        scroll.buffer_height += 1;
                        if follow {
                            scroll.view_top = scroll.maximum();
                        }
                        *scroll
                    };
                    sink.emit(EngineEvent::ScrollPositionChanged(state));
                    if batch % 10 == 0 {
                        sink.emit(EngineEvent::TitleChanged(format!("flood #{batch}")));
                    }
                    batch += 1;
                    thread::sleep(Duration::from_millis(1));
                }
            });
        match spawned {
            Ok(worker) => self.worker = Some(worker),
            Err(err) => tracing::warn!(target = "demo", error = %err, "engine worker failed to start"),
        }
    }

    fn unsubscribe(&mut self) {
        self.stop_worker();
    }

    fn write_input(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.written.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn resize(&mut self, rows: u16, _cols: u16) -> Result<(), EngineError> {
        let mut scroll = self.scroll.lock();
        scroll.view_height = i32::from(rows);
        scroll.buffer_height = scroll.buffer_height.max(scroll.view_height);
        *scroll = scroll.clamped();
        Ok(())
    }

    fn scroll_state(&self) -> ScrollState {
        *self.scroll.lock()
    }

    fn scroll_viewport(&mut self, view_top: i32) {
        let mut scroll = self.scroll.lock();
        *scroll = scroll.with_view_top(view_top);
    }

    fn set_selection_anchor(&mut self, position: CellPosition, _mode: SelectionMode) {
        self.selection = Some((position, position));
    }

    fn set_selection_end(&mut self, position: CellPosition) {
        if let Some((_, end)) = self.selection.as_mut() {
            *end = position;
        }
    }

    fn clear_selection(&mut self) {
        self.selection = None;
    }

    fn has_selection(&self) -> bool {
        self.selection.is_some()
    }

    fn selection_text(&self, _single_line: bool) -> Option<String> {
        self.selection
            .map(|(start, end)| format!("rows {}..={}", start.row, end.row))
    }

    fn shutdown(&mut self) {
        self.stop_worker();
    }
}
