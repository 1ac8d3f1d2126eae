mod support;

use std::sync::Arc;

use support::{HostCall, RecordingEngine, RecordingFactory, RecordingHost, quiet_settings, settle};
use termctl_core::config::ControlSettings;
use termctl_core::control::{Axis, ControlCore, ControlError, ControlState, ValidationError};
use termctl_core::dispatch::Dispatcher;
use termctl_core::engine::{EngineEvent, EngineEventKind};
use termctl_core::host::FontSizeChange;
use termctl_core::scrollbar::{ScrollState, ScrollbarUpdate};

fn scroll() -> ScrollState {
    ScrollState::new(0, 24, 100)
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn initialize_creates_surface_and_announces_font() {
    let (harness, engine) = support::Harness::new(scroll());
    assert_eq!(harness.control.state(), ControlState::Uninitialized);

    harness
        .control
        .initialize(quiet_settings(), Box::new(engine))
        .expect("initialize");

    assert_eq!(harness.control.state(), ControlState::Initialized);
    assert_eq!(harness.surface.log.lock().created, 1);
    assert_eq!(harness.surface.log.lock().font_sizes, vec![12]);
    assert_eq!(harness.control.routed_event_kinds(), EngineEventKind::ALL.len());
    assert!(harness.engine.sink().is_some(), "engine subscribed");

    let calls = harness.host.calls();
    let font = calls
        .iter()
        .position(|call| {
            *call
                == HostCall::FontSize(FontSizeChange {
                    width: 6,
                    height: 12,
                    is_initial: true,
                })
        })
        .expect("initial font size reported");
    let initialized = calls
        .iter()
        .position(|call| *call == HostCall::Initialized)
        .expect("initialized reported");
    assert!(font < initialized);

    settle().await;
    assert_eq!(
        harness.host.scrollbar_updates().last(),
        Some(&ScrollbarUpdate {
            value: 0.0,
            minimum: 0.0,
            maximum: 76.0,
            viewport_size: 24.0,
        })
    );
    assert!(harness.surface.invalidations() >= 1, "first frame requested");
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn cursor_visibility_follows_the_initialized_notice() {
    let (harness, engine) = support::Harness::new(scroll());
    let settings = ControlSettings {
        cursor_blink: true,
        ..quiet_settings()
    };
    harness
        .control
        .initialize(settings, Box::new(engine))
        .expect("initialize");

    let calls = harness.host.calls();
    let initialized = calls
        .iter()
        .position(|call| *call == HostCall::Initialized)
        .expect("initialized reported");
    let cursor = calls
        .iter()
        .position(|call| matches!(call, HostCall::CursorVisible(_)))
        .expect("cursor visibility reported");
    assert!(initialized < cursor, "host calls out of order: {calls:?}");
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn second_initialize_is_rejected() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    let (engine, _probe) = RecordingEngine::new(scroll());
    let err = harness
        .control
        .initialize(quiet_settings(), Box::new(engine))
        .expect_err("already initialized");
    assert!(matches!(err, ControlError::AlreadyInitialized));
    assert_eq!(harness.surface.log.lock().created, 1);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn zero_font_size_fails_without_side_effects() {
    let (harness, engine) = support::Harness::new(scroll());
    let settings = ControlSettings {
        font_size: 0,
        ..quiet_settings()
    };

    let err = harness
        .control
        .initialize(settings, Box::new(engine))
        .expect_err("font size 0");
    assert!(matches!(
        err,
        ControlError::Validation(ValidationError::InvalidFontSize(0))
    ));
    assert_eq!(harness.control.state(), ControlState::Uninitialized);
    assert_eq!(harness.surface.log.lock().created, 0);
    assert!(harness.engine.sink().is_none(), "nothing subscribed");
    assert!(harness.host.calls().is_empty());

    harness.control.close();
    assert_eq!(harness.control.state(), ControlState::Closed);
    harness.control.close();
    assert_eq!(harness.control.state(), ControlState::Closed);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn surface_failure_leaves_nothing_registered() {
    let (engine, probe) = RecordingEngine::new(scroll());
    let host = Arc::new(RecordingHost::default());
    let control = ControlCore::new(Dispatcher::current(), RecordingFactory::failing(), host.clone());

    let err = control
        .initialize(quiet_settings(), Box::new(engine))
        .expect_err("surface failure");
    assert!(matches!(err, ControlError::SurfaceCreation(_)));
    assert_eq!(control.state(), ControlState::Uninitialized);
    assert!(probe.sink().is_none());
    assert_eq!(control.routed_event_kinds(), 0);
    assert!(host.calls().is_empty());
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn operations_before_initialize_are_refused() {
    let (harness, _engine) = support::Harness::new(scroll());
    let control = &harness.control;
    assert!(matches!(control.resize(100, 100), Err(ControlError::NotInitialized)));
    assert!(matches!(control.scroll_viewport(3), Err(ControlError::NotInitialized)));
    assert!(matches!(control.adjust_font_size(1), Err(ControlError::NotInitialized)));
    assert!(!control.send_input("ls\r"));
    assert!(!control.paste_text("ls"));
    assert!(!control.copy_selection_to_clipboard(false));
    assert_eq!(harness.engine.write_count(), 0);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn close_is_idempotent_and_drops_late_events() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    let sink = harness.engine.sink().expect("subscribed");
    harness.host.clear();

    harness.engine.emit(EngineEvent::TitleChanged("pending".into()));
    harness.engine.emit(EngineEvent::RenderNeeded);
    harness.control.close();
    assert_eq!(harness.control.state(), ControlState::Closed);
    assert!(harness.control.is_closing());
    harness.control.close();
    assert_eq!(harness.control.state(), ControlState::Closed);

    sink.emit(EngineEvent::WarningBell);
    sink.emit(EngineEvent::TitleChanged("late".into()));
    sink.emit(EngineEvent::OutputReceived);
    settle().await;

    assert!(harness.host.titles().is_empty(), "pending title discarded");
    assert_eq!(harness.host.count(|call| *call == HostCall::Bell), 0);
    assert!(harness.host.calls().is_empty());
    harness.engine.with(|log| {
        assert!(log.unsubscribed);
        assert!(log.shut_down);
    });
    assert_eq!(harness.surface.log.lock().dropped, 1);
    assert_eq!(harness.control.routed_event_kinds(), 0);

    let (engine, _probe) = RecordingEngine::new(scroll());
    assert!(matches!(
        harness.control.initialize(quiet_settings(), Box::new(engine)),
        Err(ControlError::Closed)
    ));
    assert!(matches!(harness.control.resize(10, 10), Err(ControlError::Closed)));
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn dropping_the_control_closes_it() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    let flag = harness.control.closing_flag();
    let engine = harness.engine.clone();
    drop(harness);
    assert!(flag.is_set());
    engine.with(|log| assert!(log.shut_down));
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn resize_recomputes_grid_from_cell_size() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    assert_eq!(harness.control.grid_size(), (20, 40));
    harness.engine.with(|log| assert_eq!(log.resizes.last(), Some(&(20, 40))));

    harness.control.resize(616, 136).expect("resize");
    assert_eq!(harness.control.grid_size(), (10, 100));
    assert_eq!(harness.surface.log.lock().resizes.last(), Some(&(616, 136)));

    let err = harness.control.resize(0, 50).expect_err("zero width");
    assert!(matches!(
        err,
        ControlError::Validation(ValidationError::InvalidSize { width: 0, height: 50 })
    ));
    assert_eq!(harness.control.grid_size(), (10, 100));
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn font_size_changes_relayout_and_notify() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    harness.host.clear();

    harness.control.adjust_font_size(4).expect("grow");
    assert_eq!(harness.control.font_size(), 16);
    assert_eq!(harness.control.character_dimensions().width, 8.0);
    assert_eq!(harness.control.grid_size(), (15, 30));
    assert!(harness.host.calls().contains(&HostCall::FontSize(FontSizeChange {
        width: 8,
        height: 16,
        is_initial: false,
    })));

    let err = harness.control.adjust_font_size(-16).expect_err("non-positive");
    assert!(matches!(
        err,
        ControlError::Validation(ValidationError::InvalidFontSize(0))
    ));
    assert_eq!(harness.control.font_size(), 16);

    harness.control.reset_font_size().expect("reset");
    assert_eq!(harness.control.font_size(), 12);
    assert_eq!(harness.control.grid_size(), (20, 40));
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn grid_snapping_and_minimum_size_include_padding() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;
    let control = &harness.control;
    assert_eq!(control.minimum_size(), (76.0, 28.0));
    assert_eq!(control.snap_dimension_to_grid(Axis::Width, 100.0), 100.0);
    assert_eq!(control.snap_dimension_to_grid(Axis::Width, 99.0), 94.0);
    assert_eq!(control.snap_dimension_to_grid(Axis::Height, 60.0), 52.0);
}

#[test_timeout::tokio_timeout_test(10, paused)]
async fn update_settings_applies_or_rejects_atomically() {
    let harness = support::Harness::started(scroll(), quiet_settings()).await;

    let bad = ControlSettings {
        wheel_lines: 0,
        font_size: 20,
        ..quiet_settings()
    };
    assert!(matches!(
        harness.control.update_settings(bad),
        Err(ControlError::Validation(ValidationError::InvalidWheelLines))
    ));
    assert_eq!(harness.control.font_size(), 12);

    let good = ControlSettings {
        font_size: 14,
        padding: 0.0,
        ..quiet_settings()
    };
    harness.control.update_settings(good).expect("update");
    assert_eq!(harness.control.font_size(), 14);
    assert_eq!(harness.control.settings().padding, 0.0);
    assert_eq!(harness.control.grid_size(), (18, 36));
}
