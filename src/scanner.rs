//! The unified barcode input component.
//!
//! [`UnifiedScanner`] owns one camera channel and one keyboard-wedge detector,
//! funnels both into a [`ScanUnifier`], and ties their resources to an explicit
//! mount / unmount lifecycle.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

use crate::camera::{CameraError, EngineFactory, OpticalChannel, SessionState, TorchState};
use crate::config::Config;
use crate::devices::{discover, CameraDevice, DeviceEnumeration, MediaDevices};
use crate::feedback::FeedbackEmitter;
use crate::unifier::{ScanObserver, ScanResult, ScanSource, ScanUnifier};
use crate::wedge::{FocusKeeper, FocusTracker, KeyInput, WedgeDetector, WedgeListener, WedgeOutcome};

/// Routes keydown events through the detector into the unifier.
#[derive(Debug, Clone)]
pub struct KeyRouter {
    wedge: Arc<Mutex<WedgeDetector>>,
    unifier: Arc<ScanUnifier>,
}

impl KeyRouter {
    pub fn route(&self, input: &KeyInput) -> Option<ScanResult> {
        // Release the detector before dispatch; the unifier resets it.
        let outcome = lock(&self.wedge).process(input);
        match outcome {
            WedgeOutcome::Completed(code) => self.unifier.complete_scan(&code, ScanSource::Keyboard),
            _ => None,
        }
    }
}

/// Camera + keyboard-wedge scanner with a single completion callback.
pub struct UnifiedScanner {
    config: Config,
    router: KeyRouter,
    camera: OpticalChannel,
    devices: Vec<CameraDevice>,
    selected_device: Option<String>,
    focus: Option<Arc<dyn FocusTracker>>,
    keys_tx: Option<UnboundedSender<KeyInput>>,
    key_task: Option<JoinHandle<()>>,
    listener: Option<WedgeListener>,
    focus_keeper: Option<FocusKeeper>,
}

impl std::fmt::Debug for UnifiedScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedScanner")
            .field("devices", &self.devices)
            .field("selected_device", &self.selected_device)
            .field("camera", &self.camera)
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

impl UnifiedScanner {
    pub fn new(
        config: Config,
        observer: Arc<dyn ScanObserver>,
        engines: Arc<dyn EngineFactory>,
        feedback: FeedbackEmitter,
    ) -> Self {
        let wedge = Arc::new(Mutex::new(WedgeDetector::new(config.wedge.clone())));
        let unifier = Arc::new(
            ScanUnifier::new(feedback, observer, wedge.clone())
                .with_exclusive_channels(config.scanner.exclusive_channels),
        );
        let camera = OpticalChannel::new(engines, unifier.clone(), &config.camera);

        Self {
            config,
            router: KeyRouter { wedge, unifier },
            camera,
            devices: Vec::new(),
            selected_device: None,
            focus: None,
            keys_tx: None,
            key_task: None,
            listener: None,
            focus_keeper: None,
        }
    }

    /// Discover cameras and start keyboard capture.
    ///
    /// Must be called from within a tokio runtime. Discovery problems are
    /// reported to the observer and returned on the enumeration; they never
    /// fail the mount.
    pub async fn mount(
        &mut self,
        media: &dyn MediaDevices,
        focus: Arc<dyn FocusTracker>,
    ) -> DeviceEnumeration {
        let enumeration = discover(media).await;
        self.apply_enumeration(&enumeration);

        let (keys_tx, mut keys_rx) = mpsc::unbounded_channel::<KeyInput>();
        let router = self.router.clone();
        self.key_task = Some(tokio::spawn(async move {
            while let Some(input) = keys_rx.recv().await {
                router.route(&input);
            }
        }));
        self.keys_tx = Some(keys_tx);

        self.focus_keeper = Some(FocusKeeper::spawn(
            focus.clone(),
            self.config.focus.refocus_interval(),
        ));
        self.focus = Some(focus);

        enumeration
    }

    fn apply_enumeration(&mut self, enumeration: &DeviceEnumeration) {
        let observer = self.router.unifier.observer().clone();
        self.devices = enumeration.devices.clone();
        self.camera.set_torch_capability(enumeration.torch_supported);

        if let Some(message) = &enumeration.error {
            self.selected_device = None;
            observer.on_error(Some(message));
            return;
        }

        let configured = self
            .config
            .camera
            .device
            .as_ref()
            .filter(|id| self.devices.iter().any(|d| &d.id == *id));
        let current = self
            .selected_device
            .as_ref()
            .filter(|id| self.devices.iter().any(|d| &d.id == *id));
        self.selected_device = configured
            .or(current)
            .cloned()
            .or_else(|| enumeration.default_device.clone());
        observer.on_error(None);
    }

    /// Forward global keystrokes from the OS into the detector.
    pub fn attach_global_keyboard(&mut self) -> std::io::Result<()> {
        if self.listener.as_ref().is_some_and(WedgeListener::is_attached) {
            return Ok(());
        }
        let (Some(keys), Some(focus)) = (self.keys_tx.clone(), self.focus.clone()) else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "scanner is not mounted",
            ));
        };
        self.listener = Some(WedgeListener::attach(keys, focus)?);
        Ok(())
    }

    /// Channel for hosts that deliver their own key events. `None` until mounted.
    pub fn key_sender(&self) -> Option<UnboundedSender<KeyInput>> {
        self.keys_tx.clone()
    }

    /// Feed one key synchronously. Returns the scan it completed, if any.
    pub fn handle_key(&self, input: KeyInput) -> Option<ScanResult> {
        self.router.route(&input)
    }

    /// Entry point shared by both channels; exposed for hosts with their own decoders.
    pub fn complete_scan(&self, raw: &str, source: ScanSource) -> Option<ScanResult> {
        self.router.unifier.complete_scan(raw, source)
    }

    pub fn set_auto_detect(&self, enabled: bool) {
        lock(&self.router.wedge).set_enabled(enabled);
    }

    pub fn auto_detect(&self) -> bool {
        lock(&self.router.wedge).is_enabled()
    }

    pub fn devices(&self) -> &[CameraDevice] {
        &self.devices
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn camera(&self) -> &OpticalChannel {
        &self.camera
    }

    pub fn camera_state(&self) -> SessionState {
        self.camera.state()
    }

    pub fn torch_state(&self) -> TorchState {
        self.camera.torch_state()
    }

    /// Start the camera on the selected device.
    pub async fn start_camera(&self) -> Result<(), CameraError> {
        let Some(device_id) = self.selected_device.clone() else {
            let err = CameraError::NoDeviceSelected;
            self.router.unifier.observer().on_error(Some(&err.to_string()));
            return Err(err);
        };
        self.camera.start(&device_id).await
    }

    pub async fn stop_camera(&self) {
        self.camera.stop().await;
    }

    /// Choose another camera; a running scan moves to it.
    pub async fn select_device(&mut self, device_id: &str) -> Result<(), CameraError> {
        if !self.devices.iter().any(|d| d.id == device_id) {
            return Err(CameraError::DeviceNotFound(device_id.to_string()));
        }
        self.selected_device = Some(device_id.to_string());
        self.camera.switch_device(device_id).await
    }

    pub async fn toggle_torch(&self) -> Result<TorchState, CameraError> {
        self.camera.toggle_torch().await
    }

    pub fn is_mounted(&self) -> bool {
        self.key_task.is_some()
    }

    /// Release the camera, the key listener and the focus task.
    pub async fn unmount(&mut self) {
        self.release_listeners();
        self.camera.stop().await;
    }

    fn release_listeners(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.detach();
        }
        if let Some(mut keeper) = self.focus_keeper.take() {
            keeper.stop();
        }
        self.keys_tx = None;
        if let Some(task) = self.key_task.take() {
            task.abort();
        }
        self.focus = None;
    }
}

impl Drop for UnifiedScanner {
    fn drop(&mut self) {
        // The engine's own drop releases the camera if unmount was skipped.
        self.release_listeners();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
