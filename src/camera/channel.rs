//! Lifecycle of the single active camera decoding session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

use super::engine::{DecodeEngine, EngineFactory};
use super::types::{
    CameraError, DecodeSettings, FrameOutcome, SessionState, TorchError, TorchState,
    CAMERA_STOPPED_MESSAGE, TORCH_UNSUPPORTED_MESSAGE,
};
use crate::config::CameraConfig;
use crate::unifier::{ScanSource, ScanStatus, ScanUnifier};

/// The one running decode engine and the device it is bound to.
struct ActiveSession {
    device_id: String,
    engine: Box<dyn DecodeEngine>,
    generation: u64,
    is_running: bool,
}

struct ChannelInner {
    engines: Arc<dyn EngineFactory>,
    unifier: Arc<ScanUnifier>,
    settings: DecodeSettings,
    start_timeout: Option<Duration>,
    /// Serializes start/stop/switch/torch; holding it means no other
    /// lifecycle operation is in flight.
    session: tokio::sync::Mutex<Option<ActiveSession>>,
    state: Mutex<SessionState>,
    torch: Mutex<TorchState>,
    /// Platform-level torch capability from device discovery
    torch_capable: AtomicBool,
    active_device: Mutex<Option<String>>,
    next_generation: AtomicU64,
    /// Generation of the session frames may complete; 0 when none
    active_generation: AtomicU64,
}

/// Camera-based scan channel.
///
/// Cheap to clone; clones share the same session. At most one decode engine
/// exists at any time: every start tears down the previous session first.
#[derive(Clone)]
pub struct OpticalChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for OpticalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpticalChannel")
            .field("state", &self.state())
            .field("torch", &self.torch_state())
            .field("active_device", &self.active_device())
            .finish_non_exhaustive()
    }
}

impl OpticalChannel {
    pub fn new(
        engines: Arc<dyn EngineFactory>,
        unifier: Arc<ScanUnifier>,
        config: &CameraConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                engines,
                unifier,
                settings: DecodeSettings::from(config),
                start_timeout: config.start_timeout(),
                session: tokio::sync::Mutex::new(None),
                state: Mutex::new(SessionState::Idle),
                torch: Mutex::new(TorchState::default()),
                torch_capable: AtomicBool::new(false),
                active_device: Mutex::new(None),
                next_generation: AtomicU64::new(0),
                active_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.inner.state)
    }

    pub fn is_scanning(&self) -> bool {
        self.state() == SessionState::Scanning
    }

    pub fn torch_state(&self) -> TorchState {
        *lock(&self.inner.torch)
    }

    /// Device of the running session, if any.
    pub fn active_device(&self) -> Option<String> {
        lock(&self.inner.active_device).clone()
    }

    /// Record whether the platform can drive a torch at all.
    pub fn set_torch_capability(&self, supported: bool) {
        self.inner.torch_capable.store(supported, Ordering::SeqCst);
        let mut torch = lock(&self.inner.torch);
        torch.supported = supported;
        if !supported {
            torch.enabled = false;
        }
    }

    /// Start scanning on `device_id`, replacing any running session.
    ///
    /// Failures are reported to the observer, leave the channel `Idle`, and are
    /// also returned.
    pub async fn start(&self, device_id: &str) -> Result<(), CameraError> {
        let mut slot = self.inner.session.lock().await;
        self.start_locked(&mut slot, device_id).await
    }

    /// Stop scanning. Safe in any state; a stop issued during a start takes
    /// effect as soon as that start settles.
    pub async fn stop(&self) {
        let mut slot = self.inner.session.lock().await;
        self.teardown_locked(&mut slot).await;
    }

    /// Move to another camera. Resumes scanning only if a session was running.
    pub async fn switch_device(&self, device_id: &str) -> Result<(), CameraError> {
        let mut slot = self.inner.session.lock().await;
        let was_scanning = slot.is_some();
        self.teardown_locked(&mut slot).await;
        if was_scanning {
            self.start_locked(&mut slot, device_id).await
        } else {
            Ok(())
        }
    }

    /// Flip the flashlight of the running session.
    ///
    /// A no-op returning the unchanged state when the torch is unsupported or
    /// nothing is running. A missing video track revokes torch support for the
    /// session without stopping the scan.
    pub async fn toggle_torch(&self) -> Result<TorchState, CameraError> {
        let current = self.torch_state();
        if !current.supported {
            return Ok(current);
        }

        let slot = self.inner.session.lock().await;
        let torch = match slot.as_ref() {
            None => return Ok(current),
            Some(session) => session.engine.torch(),
        };

        let next = !current.enabled;
        let outcome = match torch {
            Some(torch) if torch.is_supported() => torch.set(next).await,
            Some(_) => Err(TorchError::Unsupported),
            None => Err(TorchError::TrackNotFound),
        };
        drop(slot);

        match outcome {
            Ok(()) => {
                lock(&self.inner.torch).enabled = next;
                Ok(self.torch_state())
            }
            Err(e) if e.revokes_support() => {
                log::warn!("Torch toggle failed: {}", e);
                *lock(&self.inner.torch) = TorchState {
                    supported: false,
                    enabled: false,
                };
                self.inner
                    .unifier
                    .observer()
                    .on_error(Some(TORCH_UNSUPPORTED_MESSAGE));
                Err(CameraError::Torch(e))
            }
            Err(e) => {
                log::warn!("Torch toggle failed: {}", e);
                Err(CameraError::Torch(e))
            }
        }
    }

    async fn start_locked(
        &self,
        slot: &mut Option<ActiveSession>,
        device_id: &str,
    ) -> Result<(), CameraError> {
        self.teardown_locked(slot).await;

        let observer = self.inner.unifier.observer().clone();
        self.set_state(SessionState::Starting);
        *lock(&self.inner.torch) = TorchState {
            supported: self.inner.torch_capable.load(Ordering::SeqCst),
            enabled: false,
        };
        observer.on_status_changed(ScanStatus::Scanning);

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let mut engine = self.inner.engines.create();

        let result = {
            let attach = engine.start(device_id, &self.inner.settings, frames_tx);
            match self.inner.start_timeout {
                Some(limit) => tokio::time::timeout(limit, attach)
                    .await
                    .unwrap_or(Err(CameraError::StartTimedOut(limit))),
                None => attach.await,
            }
        };

        match result {
            Ok(()) => {
                *slot = Some(ActiveSession {
                    device_id: device_id.to_string(),
                    engine,
                    generation,
                    is_running: true,
                });
                *lock(&self.inner.active_device) = Some(device_id.to_string());
                self.inner
                    .active_generation
                    .store(generation, Ordering::SeqCst);
                self.inner.unifier.set_camera_armed(true);
                self.set_state(SessionState::Scanning);
                tokio::spawn(pump_frames(self.clone(), generation, frames_rx));
                log::debug!("camera session {} scanning on {}", generation, device_id);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start camera scanner: {}", e);
                self.set_state(SessionState::Error);
                observer.on_error(Some(&e.to_string()));

                self.set_state(SessionState::Stopping);
                if let Err(stop_err) = engine.stop().await {
                    log::warn!("Failed to stop camera scanner: {}", stop_err);
                }
                engine.clear();
                lock(&self.inner.torch).enabled = false;
                self.set_state(SessionState::Idle);
                observer.on_status_changed(ScanStatus::Idle);
                Err(e)
            }
        }
    }

    async fn teardown_locked(&self, slot: &mut Option<ActiveSession>) {
        let Some(mut session) = slot.take() else {
            return;
        };

        self.set_state(SessionState::Stopping);
        self.inner.active_generation.store(0, Ordering::SeqCst);
        self.inner.unifier.set_camera_armed(false);

        if session.is_running {
            if let Err(e) = session.engine.stop().await {
                log::warn!("Failed to stop camera scanner: {}", e);
            }
            session.is_running = false;
        }
        session.engine.clear();
        log::debug!(
            "camera session {} on {} released",
            session.generation,
            session.device_id
        );
        drop(session);

        lock(&self.inner.torch).enabled = false;
        *lock(&self.inner.active_device) = None;
        self.set_state(SessionState::Idle);
        self.inner
            .unifier
            .observer()
            .on_status_changed(ScanStatus::Idle);
    }

    /// Stop only if `generation` is still the running session, reporting
    /// `error` first when given.
    async fn stop_generation(&self, generation: u64, error: Option<&str>) {
        let mut slot = self.inner.session.lock().await;
        if slot.as_ref().is_some_and(|s| s.generation == generation) {
            if let Some(message) = error {
                self.inner.unifier.observer().on_error(Some(message));
            }
            self.teardown_locked(&mut slot).await;
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.active_generation.load(Ordering::SeqCst) == generation
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.inner.state);
        if *current != state {
            log::debug!("camera: {} -> {}", *current, state);
            *current = state;
        }
    }
}

/// Consume frames of one session. The first non-blank decode completes the
/// scan and ends the session; decoding is single-shot.
///
/// A stream that closes while the session is still current means the engine
/// died underneath it (device unplugged, access revoked, process exited).
async fn pump_frames(
    channel: OpticalChannel,
    generation: u64,
    mut frames: UnboundedReceiver<FrameOutcome>,
) {
    loop {
        let Some(outcome) = frames.recv().await else {
            if channel.is_current(generation) {
                log::warn!("camera session {} lost its frame stream", generation);
                channel
                    .stop_generation(generation, Some(CAMERA_STOPPED_MESSAGE))
                    .await;
            }
            return;
        };
        let text = match outcome {
            FrameOutcome::NotFound => {
                log::trace!("camera: no code in frame");
                continue;
            }
            FrameOutcome::Decoded(text) => text,
        };
        if text.trim().is_empty() {
            continue;
        }
        if !channel.is_current(generation) {
            return;
        }

        channel
            .inner
            .unifier
            .complete_scan(&text, ScanSource::Camera);
        channel.stop_generation(generation, None).await;
        return;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
