//! Single funnel for completed scans from every input channel.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::feedback::FeedbackEmitter;
use crate::wedge::WedgeDetector;

/// Which channel produced a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource {
    Camera,
    Keyboard,
}

impl fmt::Display for ScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanSource::Camera => write!(f, "camera"),
            ScanSource::Keyboard => write!(f, "keyboard"),
        }
    }
}

/// Coarse scanner status reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Idle,
    Scanning,
}

/// A normalized, non-empty scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub code: String,
    pub source: ScanSource,
}

impl ScanResult {
    /// Trim `raw`; blank input yields `None`.
    pub fn normalize(raw: &str, source: ScanSource) -> Option<Self> {
        let code = raw.trim();
        if code.is_empty() {
            return None;
        }
        Some(Self {
            code: code.to_string(),
            source,
        })
    }
}

/// Receives everything the scanner reports upward.
///
/// Only `on_scan_completed` is required; status and error notifications are
/// best-effort.
pub trait ScanObserver: Send + Sync {
    fn on_scan_completed(&self, code: &str);

    fn on_status_changed(&self, _status: ScanStatus) {}

    /// `None` clears a previously reported error.
    fn on_error(&self, _message: Option<&str>) {}
}

/// Normalizes scans, fires feedback and dispatches to the observer.
pub struct ScanUnifier {
    feedback: FeedbackEmitter,
    observer: Arc<dyn ScanObserver>,
    wedge: Arc<Mutex<WedgeDetector>>,
    exclusive_channels: bool,
    camera_armed: AtomicBool,
}

impl fmt::Debug for ScanUnifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanUnifier")
            .field("exclusive_channels", &self.exclusive_channels)
            .field("camera_armed", &self.camera_armed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ScanUnifier {
    pub fn new(
        feedback: FeedbackEmitter,
        observer: Arc<dyn ScanObserver>,
        wedge: Arc<Mutex<WedgeDetector>>,
    ) -> Self {
        Self {
            feedback,
            observer,
            wedge,
            exclusive_channels: false,
            camera_armed: AtomicBool::new(false),
        }
    }

    /// Drop keyboard scans while the camera is scanning.
    ///
    /// Off by default: both channels dispatch independently and a physical
    /// code seen by both is reported twice.
    pub fn with_exclusive_channels(mut self, exclusive: bool) -> Self {
        self.exclusive_channels = exclusive;
        self
    }

    pub fn observer(&self) -> &Arc<dyn ScanObserver> {
        &self.observer
    }

    pub fn wedge(&self) -> &Arc<Mutex<WedgeDetector>> {
        &self.wedge
    }

    pub(crate) fn set_camera_armed(&self, armed: bool) {
        self.camera_armed.store(armed, Ordering::SeqCst);
    }

    /// Finish one physical scan. Blank input is a no-op.
    ///
    /// Returns the dispatched result, if any.
    pub fn complete_scan(&self, raw: &str, source: ScanSource) -> Option<ScanResult> {
        let result = ScanResult::normalize(raw, source)?;

        if self.exclusive_channels
            && source == ScanSource::Keyboard
            && self.camera_armed.load(Ordering::SeqCst)
        {
            log::debug!("keyboard scan dropped while camera is armed");
            self.reset_wedge();
            return None;
        }

        self.feedback.emit();
        log::info!("scan completed via {}: {}", result.source, result.code);
        self.observer.on_scan_completed(&result.code);
        self.reset_wedge();
        Some(result)
    }

    fn reset_wedge(&self) {
        self.wedge
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reset();
    }
}
