mod common;

use common::{fast_settings, wait_for, within, ScriptedBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tr1launcher::controller::enumerator;
use tr1launcher::controller::{
    CaptureSession, ControllerError, ControllerHandle, ControllerSettings, DeviceId,
    JoystickOffset, SessionState,
};

const WAIT: Duration = Duration::from_secs(2);

fn manual_session(backend: &Arc<ScriptedBackend>) -> Arc<CaptureSession> {
    CaptureSession::new(backend.clone(), fast_settings())
}

#[tokio::test]
async fn stop_without_capture_is_a_no_op() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);

    session.stop_capture(false).await;
    session.stop_capture(true).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert!(backend.released().is_empty());
}

#[tokio::test]
async fn start_capture_configures_buffer_and_attaches() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("A", "Pad1");
    let session = manual_session(&backend);

    session.start_capture(&DeviceId::from("A")).await.unwrap();

    assert_eq!(session.state(), SessionState::Attached);
    assert!(session.is_attached());
    assert_eq!(session.attached_device(), Some(DeviceId::from("A")));
    assert_eq!(backend.buffer_sizes(), vec![128]);
}

#[tokio::test]
async fn refused_acquisition_leaves_session_idle() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("A", "Pad1");
    backend.refuse("A");
    let session = manual_session(&backend);

    let result = session.start_capture(&DeviceId::from("A")).await;

    assert!(matches!(
        result,
        Err(ControllerError::DeviceUnavailable { .. })
    ));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(!session.is_attached());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.poll_count(), 0);
}

#[tokio::test]
async fn start_capture_replaces_previous_device() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);

    session.start_capture(&DeviceId::from("A")).await.unwrap();
    session.start_capture(&DeviceId::from("B")).await.unwrap();

    assert_eq!(session.attached_device(), Some(DeviceId::from("B")));
    assert_eq!(backend.released(), vec![DeviceId::from("A")]);
}

#[tokio::test]
async fn scan_captures_first_gamepad_and_publishes_presses() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_joystick("J", "Stick");
    backend.plug_gamepad("A", "Pad1");
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();
    let mut presses = controller.subscribe();

    assert!(wait_for(WAIT, || session.is_attached()).await);
    assert_eq!(session.attached_device(), Some(DeviceId::from("A")));

    backend.push(JoystickOffset::Button(0), 128);
    let event = within(WAIT, presses.recv()).await.unwrap();
    assert_eq!(event.button_offset, 48);
    assert_eq!(event.pov_value, 128);
    assert_eq!(event.named_offset, "Buttons0");

    controller.dispose().await;
}

#[tokio::test]
async fn only_relevant_updates_are_published() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);
    let mut presses = session.subscribe();
    session.start_capture(&DeviceId::from("A")).await.unwrap();

    backend.push(JoystickOffset::X, 32768);
    backend.push(JoystickOffset::Button(1), 0);
    backend.push(JoystickOffset::PointOfView(0), 4500);
    backend.push(JoystickOffset::X, 0);
    backend.push(JoystickOffset::PointOfView(0), 27000);

    let stick = within(WAIT, presses.recv()).await.unwrap();
    assert_eq!((stick.button_offset, stick.pov_value), (0, 0));
    assert_eq!(stick.named_offset, "X");

    let hat = within(WAIT, presses.recv()).await.unwrap();
    assert_eq!((hat.button_offset, hat.pov_value), (32, 27000));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(presses.try_recv(), Err(TryRecvError::Empty)));

    session.dispose().await;
}

#[tokio::test]
async fn lap_and_start_channels_stay_silent() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);
    let mut presses = session.subscribe();
    let mut lap = session.channels().subscribe_lap_button_pressed();
    let mut start = session.channels().subscribe_start_button_pressed();
    session.start_capture(&DeviceId::from("A")).await.unwrap();

    backend.push(JoystickOffset::Button(7), 128);
    within(WAIT, presses.recv()).await.unwrap();

    assert!(matches!(lap.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(start.try_recv(), Err(TryRecvError::Empty)));

    session.dispose().await;
}

#[tokio::test]
async fn poll_error_releases_device_promptly() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = CaptureSession::new(backend.clone(), ControllerSettings::default());
    session.start_capture(&DeviceId::from("A")).await.unwrap();

    backend.fail_next_poll();
    assert!(wait_for(WAIT, || session.state() == SessionState::Idle).await);

    let failed_at = backend.failed_at().unwrap();
    assert!(failed_at.elapsed() < Duration::from_millis(250) + Duration::from_millis(100));
    assert_eq!(backend.released(), vec![DeviceId::from("A")]);
    assert!(!backend.is_held());
    assert!(!session.is_attached());
}

#[tokio::test]
async fn stop_capture_releases_and_stops_polling() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);
    session.start_capture(&DeviceId::from("A")).await.unwrap();
    assert!(wait_for(WAIT, || backend.poll_count() > 0).await);

    within(WAIT, session.stop_capture(false)).await;

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.released(), vec![DeviceId::from("A")]);

    let polls = backend.poll_count();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(backend.poll_count(), polls);
}

#[tokio::test]
async fn stop_capture_is_bounded_by_a_hung_poll() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = CaptureSession::new(backend.clone(), ControllerSettings::default());
    session.start_capture(&DeviceId::from("A")).await.unwrap();
    assert!(wait_for(WAIT, || backend.poll_count() > 0).await);

    // The next poll starts after one interval and then hangs
    backend.set_poll_delay(Duration::from_millis(1500));
    let polls = backend.poll_count();
    assert!(wait_for(WAIT, || backend.poll_count() > polls).await);

    let started = tokio::time::Instant::now();
    session.stop_capture(false).await;
    let elapsed = started.elapsed();

    assert!(
        elapsed < Duration::from_millis(250) + Duration::from_millis(150),
        "stop_capture took {:?}",
        elapsed
    );
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.released(), vec![DeviceId::from("A")]);
    assert!(!backend.is_held());

    // The status queries stay responsive while the platform call is stuck
    let started = tokio::time::Instant::now();
    assert!(!session.is_attached());
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[tokio::test]
async fn hung_poll_does_not_touch_the_next_capture() {
    let backend = Arc::new(ScriptedBackend::new());
    let session = manual_session(&backend);
    session.start_capture(&DeviceId::from("A")).await.unwrap();
    assert!(wait_for(WAIT, || backend.poll_count() > 0).await);

    backend.set_poll_delay(Duration::from_millis(400));
    let polls = backend.poll_count();
    assert!(wait_for(WAIT, || backend.poll_count() > polls).await);

    session.start_capture(&DeviceId::from("B")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(session.state(), SessionState::Attached);
    assert_eq!(session.attached_device(), Some(DeviceId::from("B")));
    assert_eq!(backend.released(), vec![DeviceId::from("A")]);

    session.dispose().await;
}

#[tokio::test]
async fn scan_recaptures_after_device_loss() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("A", "Pad1");
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();
    assert!(wait_for(WAIT, || session.is_attached()).await);

    backend.fail_next_poll();
    assert!(wait_for(WAIT, || !backend.released().is_empty()).await);
    assert!(wait_for(WAIT, || session.is_attached()).await);
    assert_eq!(
        backend.acquire_calls(),
        vec![DeviceId::from("A"), DeviceId::from("A")]
    );

    controller.dispose().await;
}

#[tokio::test]
async fn failing_probe_reports_detached_and_scan_releases() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("A", "Pad1");
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();
    assert!(wait_for(WAIT, || session.is_attached()).await);

    backend.unplug_all();
    backend.set_probe_failing(true);

    assert!(!session.is_attached());
    assert!(wait_for(WAIT, || session.state() == SessionState::Idle).await);
    assert!(backend.released().contains(&DeviceId::from("A")));

    controller.dispose().await;
}

#[tokio::test]
async fn stop_with_scanning_prevents_new_captures() {
    let backend = Arc::new(ScriptedBackend::new());
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();

    within(WAIT, controller.stop_capture(true)).await;
    backend.plug_gamepad("A", "Pad1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(backend.acquire_calls().is_empty());

    session.start_joystick_support();
    assert!(wait_for(WAIT, || session.is_attached()).await);

    controller.dispose().await;
}

#[tokio::test]
async fn dispose_is_idempotent_and_final() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("A", "Pad1");
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();
    assert!(wait_for(WAIT, || session.is_attached()).await);

    within(WAIT, controller.dispose()).await;
    within(WAIT, controller.dispose()).await;

    assert!(session.is_disposed());
    assert_eq!(backend.shutdown_calls(), 1);
    assert!(!backend.is_held());
    assert!(matches!(
        session.start_capture(&DeviceId::from("A")).await,
        Err(ControllerError::Disposed)
    ));
}

#[tokio::test]
async fn enumeration_lists_gamepads_before_joysticks() {
    let backend = ScriptedBackend::new();
    backend.plug_joystick("J", "Stick");
    backend.plug_gamepad("A", "Pad1");
    backend.plug_gamepad("B", "Pad2");

    let ids: Vec<_> = enumerator::list_devices(&backend)
        .into_iter()
        .map(|d| d.id)
        .collect();

    assert_eq!(ids, vec![DeviceId::from("A"), DeviceId::from("B"), DeviceId::from("J")]);
}

#[tokio::test]
async fn scan_skips_devices_without_id() {
    let backend = Arc::new(ScriptedBackend::new());
    backend.plug_gamepad("  ", "Half-initialised");
    backend.plug_gamepad("A", "Pad1");
    let controller = ControllerHandle::with_backend(backend.clone(), Some(fast_settings()));
    let session = controller.session();

    assert!(wait_for(WAIT, || session.is_attached()).await);
    assert_eq!(backend.acquire_calls(), vec![DeviceId::from("A")]);

    controller.dispose().await;
}
