//! Session lifecycle of the optical channel against a fake decode engine.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{wait_until, FakeEngines, FakeTorch, RecordingObserver};
use shop_scanner::camera::{
    CameraError, FrameOutcome, OpticalChannel, SessionState, TorchError, TorchState,
    CAMERA_STOPPED_MESSAGE, TORCH_UNSUPPORTED_MESSAGE,
};
use shop_scanner::config::CameraConfig;
use shop_scanner::feedback::FeedbackEmitter;
use shop_scanner::unifier::{ScanStatus, ScanUnifier};
use shop_scanner::wedge::WedgeDetector;

fn channel_with(
    engines: &Arc<FakeEngines>,
    config: &CameraConfig,
) -> (OpticalChannel, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let unifier = Arc::new(ScanUnifier::new(
        FeedbackEmitter::silent(),
        observer.clone(),
        Arc::new(Mutex::new(WedgeDetector::default())),
    ));
    let channel = OpticalChannel::new(engines.factory(), unifier, config);
    (channel, observer)
}

fn channel(engines: &Arc<FakeEngines>) -> (OpticalChannel, Arc<RecordingObserver>) {
    channel_with(engines, &CameraConfig::default())
}

#[tokio::test]
async fn test_start_reaches_scanning() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();

    assert_eq!(channel.state(), SessionState::Scanning);
    assert_eq!(channel.active_device().as_deref(), Some("cam-a"));
    assert_eq!(engines.live(), 1);
    assert_eq!(observer.statuses(), vec![ScanStatus::Scanning]);
}

#[tokio::test]
async fn test_restart_replaces_session() {
    let engines = FakeEngines::new();
    let (channel, _observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    channel.start("cam-b").await.unwrap();

    assert_eq!(engines.live(), 1);
    assert_eq!(engines.stops.load(Ordering::SeqCst), 1);
    assert_eq!(channel.active_device().as_deref(), Some("cam-b"));
    assert_eq!(engines.starts(), vec!["cam-a", "cam-b"]);
}

#[tokio::test]
async fn test_concurrent_starts_leave_one_session() {
    let engines = FakeEngines::new();
    *engines.start_delay.lock().unwrap() = Some(Duration::from_millis(20));
    let (channel, _observer) = channel(&engines);

    let (a, b) = tokio::join!(channel.start("cam-a"), channel.start("cam-b"));
    assert!(a.is_ok());
    assert!(b.is_ok());

    assert_eq!(engines.live(), 1);
    assert_eq!(channel.state(), SessionState::Scanning);
    assert_eq!(channel.active_device().as_deref(), Some("cam-b"));
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.stop().await;
    channel.stop().await;

    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(engines.stops.load(Ordering::SeqCst), 0);
    assert!(observer.statuses().is_empty());
}

#[tokio::test]
async fn test_stop_releases_engine() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    channel.stop().await;

    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(engines.live(), 0);
    assert_eq!(channel.active_device(), None);
    assert_eq!(
        observer.statuses(),
        vec![ScanStatus::Scanning, ScanStatus::Idle]
    );
    assert!(!engines.send(FrameOutcome::Decoded("late".to_string())));
}

#[tokio::test]
async fn test_stop_issued_during_start_wins() {
    let engines = FakeEngines::new();
    *engines.start_delay.lock().unwrap() = Some(Duration::from_millis(30));
    let (channel, _observer) = channel(&engines);

    let starter = channel.clone();
    let start = tokio::spawn(async move { starter.start("cam-a").await });
    wait_until(|| channel.state() == SessionState::Starting).await;
    channel.stop().await;

    assert!(start.await.unwrap().is_ok());
    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(engines.live(), 0);
}

#[tokio::test]
async fn test_decode_completes_once_and_returns_to_idle() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    assert!(engines.send(FrameOutcome::Decoded("  4006381333931\n".to_string())));
    // Frames already in flight behind the first decode are dropped.
    engines.send(FrameOutcome::Decoded("4006381333931".to_string()));

    wait_until(|| channel.state() == SessionState::Idle).await;
    assert_eq!(observer.scans(), vec!["4006381333931"]);
    assert_eq!(engines.live(), 0);
    assert_eq!(observer.statuses().last(), Some(&ScanStatus::Idle));
}

#[tokio::test]
async fn test_not_found_and_blank_frames_are_silent() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    for _ in 0..20 {
        engines.send(FrameOutcome::NotFound);
    }
    engines.send(FrameOutcome::Decoded("   ".to_string()));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(channel.state(), SessionState::Scanning);
    assert!(observer.scans().is_empty());
    assert!(observer.errors().is_empty());

    engines.send(FrameOutcome::Decoded("QR-123".to_string()));
    wait_until(|| !observer.scans().is_empty()).await;
    assert_eq!(observer.scans(), vec!["QR-123"]);
}

#[tokio::test]
async fn test_engine_dying_mid_scan_reports_and_returns_to_idle() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    engines.disconnect();

    wait_until(|| channel.state() == SessionState::Idle).await;
    assert_eq!(engines.live(), 0);
    assert_eq!(channel.active_device(), None);
    assert_eq!(observer.last_error().as_deref(), Some(CAMERA_STOPPED_MESSAGE));
    assert_eq!(observer.statuses().last(), Some(&ScanStatus::Idle));
    assert!(observer.scans().is_empty());

    // A fresh start works after the loss.
    channel.start("cam-a").await.unwrap();
    assert_eq!(channel.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_requested_stop_reports_no_error() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    channel.stop().await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(observer.errors().is_empty());
}

#[tokio::test]
async fn test_start_failure_reports_and_ends_idle() {
    let engines = FakeEngines::new();
    *engines.fail_with.lock().unwrap() = Some("NotAllowedError: Permission denied".to_string());
    let (channel, observer) = channel(&engines);

    let err = channel.start("cam-a").await.unwrap_err();

    assert!(matches!(err, CameraError::PermissionDenied));
    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(engines.live(), 0);
    assert_eq!(
        observer.last_error().as_deref(),
        Some("Camera permission denied. Grant camera access and try again")
    );
    assert_eq!(
        observer.statuses(),
        vec![ScanStatus::Scanning, ScanStatus::Idle]
    );
}

#[tokio::test]
async fn test_failed_start_can_be_retried() {
    let engines = FakeEngines::new();
    *engines.fail_with.lock().unwrap() = Some("device busy".to_string());
    let (channel, _observer) = channel(&engines);

    assert!(matches!(
        channel.start("cam-a").await,
        Err(CameraError::StartFailed(msg)) if msg == "device busy"
    ));

    *engines.fail_with.lock().unwrap() = None;
    channel.start("cam-a").await.unwrap();
    assert_eq!(channel.state(), SessionState::Scanning);
}

#[tokio::test(start_paused = true)]
async fn test_hung_start_times_out() {
    let engines = FakeEngines::new();
    engines.hang.store(true, Ordering::SeqCst);
    let config = CameraConfig {
        start_timeout_ms: Some(500),
        ..CameraConfig::default()
    };
    let (channel, observer) = channel_with(&engines, &config);

    let err = channel.start("cam-a").await.unwrap_err();

    assert!(matches!(err, CameraError::StartTimedOut(d) if d == Duration::from_millis(500)));
    assert_eq!(channel.state(), SessionState::Idle);
    assert!(observer.last_error().is_some());
}

#[tokio::test]
async fn test_switch_while_idle_stays_idle() {
    let engines = FakeEngines::new();
    let (channel, _observer) = channel(&engines);

    channel.switch_device("cam-b").await.unwrap();

    assert_eq!(channel.state(), SessionState::Idle);
    assert!(engines.starts().is_empty());
}

#[tokio::test]
async fn test_switch_while_scanning_moves_session() {
    let engines = FakeEngines::new();
    let (channel, _observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    channel.switch_device("cam-b").await.unwrap();

    assert_eq!(channel.state(), SessionState::Scanning);
    assert_eq!(channel.active_device().as_deref(), Some("cam-b"));
    assert_eq!(engines.live(), 1);
}

#[tokio::test]
async fn test_torch_toggle_unsupported_is_noop() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);

    channel.start("cam-a").await.unwrap();
    let state = channel.toggle_torch().await.unwrap();

    assert_eq!(state, TorchState::default());
    assert!(observer.errors().is_empty());
}

#[tokio::test]
async fn test_torch_toggles_on_and_off() {
    let engines = FakeEngines::new();
    let torch = Arc::new(FakeTorch {
        supported: true,
        ..FakeTorch::default()
    });
    *engines.torch.lock().unwrap() = Some(torch.clone());
    let (channel, _observer) = channel(&engines);
    channel.set_torch_capability(true);

    channel.start("cam-a").await.unwrap();
    assert!(channel.toggle_torch().await.unwrap().enabled);
    assert!(!channel.toggle_torch().await.unwrap().enabled);
    assert_eq!(*torch.calls.lock().unwrap(), vec![true, false]);

    channel.toggle_torch().await.unwrap();
    channel.stop().await;
    assert_eq!(
        channel.torch_state(),
        TorchState {
            supported: true,
            enabled: false
        }
    );
}

#[tokio::test]
async fn test_torch_without_session_is_noop() {
    let engines = FakeEngines::new();
    let (channel, _observer) = channel(&engines);
    channel.set_torch_capability(true);

    let state = channel.toggle_torch().await.unwrap();
    assert!(state.supported);
    assert!(!state.enabled);
}

#[tokio::test]
async fn test_missing_track_revokes_torch_and_keeps_scanning() {
    let engines = FakeEngines::new();
    let (channel, observer) = channel(&engines);
    channel.set_torch_capability(true);

    channel.start("cam-a").await.unwrap();
    let err = channel.toggle_torch().await.unwrap_err();

    assert!(matches!(err, CameraError::Torch(TorchError::TrackNotFound)));
    assert!(!channel.torch_state().supported);
    assert_eq!(observer.last_error().as_deref(), Some(TORCH_UNSUPPORTED_MESSAGE));
    assert_eq!(channel.state(), SessionState::Scanning);
}

#[tokio::test]
async fn test_rejected_torch_constraint_keeps_support() {
    let engines = FakeEngines::new();
    *engines.torch.lock().unwrap() = Some(Arc::new(FakeTorch {
        supported: true,
        reject: true,
        ..FakeTorch::default()
    }));
    let (channel, observer) = channel(&engines);
    channel.set_torch_capability(true);

    channel.start("cam-a").await.unwrap();
    let err = channel.toggle_torch().await.unwrap_err();

    assert!(matches!(
        err,
        CameraError::Torch(TorchError::ConstraintRejected(_))
    ));
    assert_eq!(
        channel.torch_state(),
        TorchState {
            supported: true,
            enabled: false
        }
    );
    assert!(observer.errors().is_empty());
}
