//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shop_scanner::camera::{
    classify_start_error, CameraError, DecodeEngine, DecodeSettings, EngineFactory, FrameOutcome,
    FrameSender, TorchController, TorchError,
};
use shop_scanner::devices::{CameraDevice, DeviceError, MediaDevices};
use shop_scanner::unifier::{ScanObserver, ScanStatus};

/// Records every observer callback.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub scans: Mutex<Vec<String>>,
    pub statuses: Mutex<Vec<ScanStatus>>,
    pub errors: Mutex<Vec<Option<String>>>,
}

impl RecordingObserver {
    pub fn scans(&self) -> Vec<String> {
        self.scans.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<ScanStatus> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<Option<String>> {
        self.errors.lock().unwrap().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.lock().unwrap().last().cloned().flatten()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_scan_completed(&self, code: &str) {
        self.scans.lock().unwrap().push(code.to_string());
    }

    fn on_status_changed(&self, status: ScanStatus) {
        self.statuses.lock().unwrap().push(status);
    }

    fn on_error(&self, message: Option<&str>) {
        self.errors.lock().unwrap().push(message.map(str::to_string));
    }
}

/// Shared view into every engine the fake factory created.
#[derive(Default)]
pub struct FakeEngines {
    pub starts: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    pub clears: AtomicUsize,
    /// Engines started successfully and not yet cleared
    pub live: AtomicUsize,
    /// Sender of the most recently started engine
    sender: Mutex<Option<FrameSender>>,
    /// Make the next starts fail with this engine message
    pub fail_with: Mutex<Option<String>>,
    /// Make starts never finish
    pub hang: AtomicBool,
    /// Delay every start by this long
    pub start_delay: Mutex<Option<Duration>>,
    pub torch: Mutex<Option<Arc<FakeTorch>>>,
}

impl FakeEngines {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn EngineFactory> {
        let engines = self.clone();
        Arc::new(move || {
            Box::new(FakeEngine {
                engines: engines.clone(),
                started: false,
            }) as Box<dyn DecodeEngine>
        })
    }

    /// Deliver a frame to the running session. False when no session listens.
    pub fn send(&self, outcome: FrameOutcome) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Drop the running engine's frame sender as if the engine died,
    /// without any stop request.
    pub fn disconnect(&self) {
        self.sender.lock().unwrap().take();
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }
}

pub struct FakeEngine {
    engines: Arc<FakeEngines>,
    started: bool,
}

#[async_trait]
impl DecodeEngine for FakeEngine {
    async fn start(
        &mut self,
        device_id: &str,
        _settings: &DecodeSettings,
        frames: FrameSender,
    ) -> Result<(), CameraError> {
        self.engines.starts.lock().unwrap().push(device_id.to_string());

        let delay = *self.engines.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.engines.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failure = self.engines.fail_with.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(classify_start_error(&message));
        }

        *self.engines.sender.lock().unwrap() = Some(frames);
        self.engines.live.fetch_add(1, Ordering::SeqCst);
        self.started = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        self.engines.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&mut self) {
        self.engines.clears.fetch_add(1, Ordering::SeqCst);
        if self.started {
            self.started = false;
            *self.engines.sender.lock().unwrap() = None;
            self.engines.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn torch(&self) -> Option<Arc<dyn TorchController>> {
        self.engines
            .torch
            .lock()
            .unwrap()
            .clone()
            .map(|t| t as Arc<dyn TorchController>)
    }
}

/// Flashlight that records what it was asked to do.
#[derive(Debug, Default)]
pub struct FakeTorch {
    pub supported: bool,
    pub reject: bool,
    pub calls: Mutex<Vec<bool>>,
}

#[async_trait]
impl TorchController for FakeTorch {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn set(&self, enabled: bool) -> Result<(), TorchError> {
        self.calls.lock().unwrap().push(enabled);
        if self.reject {
            return Err(TorchError::ConstraintRejected("OverconstrainedError".to_string()));
        }
        Ok(())
    }
}

/// Media devices with a fixed camera list.
pub struct FakeMedia {
    pub devices: Vec<CameraDevice>,
    pub torch: bool,
    pub permission_denied: bool,
}

impl FakeMedia {
    pub fn with_devices(devices: Vec<CameraDevice>) -> Self {
        Self {
            devices,
            torch: true,
            permission_denied: false,
        }
    }
}

#[async_trait]
impl MediaDevices for FakeMedia {
    async fn request_permission(&self) -> Result<(), DeviceError> {
        if self.permission_denied {
            Err(DeviceError::PermissionDenied)
        } else {
            Ok(())
        }
    }

    async fn enumerate_video_inputs(&self) -> Result<Vec<CameraDevice>, DeviceError> {
        Ok(self.devices.clone())
    }

    fn supports_torch(&self) -> bool {
        self.torch
    }
}

/// Poll `condition` until it holds, failing the test after a second.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(1), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 1s");
}
