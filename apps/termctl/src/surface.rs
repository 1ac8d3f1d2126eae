//! The render surface collaborator: paints glyphs, owns font metrics.

use thiserror::Error;

use crate::config::ControlSettings;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("render surface unavailable: {0}")]
    Unavailable(String),
    #[error("invalid surface size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("font error: {0}")]
    Font(String),
}

/// Size of one character cell in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

impl CellSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

pub trait RenderSurface: Send {
    /// Requests a repaint. Called from throttled deliveries only.
    fn invalidate(&mut self);
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;
    /// Applies a font size and returns the resulting cell size.
    fn set_font_size(&mut self, font_size: i32) -> Result<CellSize, SurfaceError>;
    fn cell_size(&self) -> CellSize;
    fn set_cursor_visible(&mut self, _visible: bool) {}
}

/// Creates render surfaces during `ControlCore::initialize`.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, settings: &ControlSettings) -> Result<Box<dyn RenderSurface>, SurfaceError>;
}

impl<F> SurfaceFactory for F
where
    F: Fn(&ControlSettings) -> Result<Box<dyn RenderSurface>, SurfaceError> + Send + Sync,
{
    fn create(&self, settings: &ControlSettings) -> Result<Box<dyn RenderSurface>, SurfaceError> {
        self(settings)
    }
}
