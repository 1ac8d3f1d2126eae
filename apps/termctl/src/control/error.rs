use thiserror::Error;

use crate::engine::EngineError;
use crate::surface::SurfaceError;

/// Bad input to a public operation. The operation had no effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("font size must be positive, got {0}")]
    InvalidFontSize(i32),
    #[error("size must be positive, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("{name} must be a positive duration")]
    InvalidInterval { name: &'static str },
    #[error("{name} must be finite and positive, got {value}")]
    InvalidVelocity { name: &'static str, value: f64 },
    #[error("padding must be finite and non-negative, got {0}")]
    InvalidPadding(f32),
    #[error("wheel_lines must be at least 1")]
    InvalidWheelLines,
    #[error("unknown key binding command '{0}'")]
    UnknownCommand(String),
    #[error("invalid key chord '{chord}': {reason}")]
    InvalidKeyChord { chord: String, reason: &'static str },
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("control is closed")]
    Closed,
    #[error("control is not initialized")]
    NotInitialized,
    #[error("control is already initialized")]
    AlreadyInitialized,
    #[error("failed to create render surface: {0}")]
    SurfaceCreation(#[source] SurfaceError),
    #[error("render surface error: {0}")]
    Surface(#[from] SurfaceError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("terminal engine is no longer available")]
    EngineUnavailable,
}

impl ControlError {
    /// Lifecycle violations are absorbed by most callers.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            ControlError::Closed | ControlError::NotInitialized | ControlError::AlreadyInitialized
        )
    }
}
