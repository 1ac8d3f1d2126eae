pub mod auto_scroll;
pub mod blink;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod host;
pub mod input;
pub mod persistence;
pub mod scrollbar;
pub mod surface;
pub mod telemetry;
pub mod throttle;
pub mod timer;

pub use config::ControlSettings;
pub use control::{Axis, ControlCore, ControlError, ControlState, ValidationError};
pub use dispatch::Dispatcher;
pub use engine::{EngineEvent, EngineEventSink, TerminalEngine};
pub use host::ControlHost;
pub use surface::{RenderSurface, SurfaceFactory};
