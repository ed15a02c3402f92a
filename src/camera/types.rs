//! Camera channel types and errors.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::CameraConfig;

/// Shown when the active camera turns out to have no controllable flashlight.
pub const TORCH_UNSUPPORTED_MESSAGE: &str = "Flashlight control is not supported on this camera.";

/// Reported when a session's frame stream ends without a stop request.
pub const CAMERA_STOPPED_MESSAGE: &str = "Camera stopped unexpectedly.";

/// Lifecycle of the optical scan channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Scanning,
    Stopping,
    /// Start failed; the channel passes through `Stopping` back to `Idle`
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Scanning => "scanning",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Flashlight availability and state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TorchState {
    pub supported: bool,
    pub enabled: bool,
}

/// Settings handed to the decode engine on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeSettings {
    /// Target frames per second to analyze
    pub fps: u32,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self { fps: 12 }
    }
}

impl From<&CameraConfig> for DecodeSettings {
    fn from(config: &CameraConfig) -> Self {
        Self { fps: config.fps }
    }
}

/// What the engine made of one analyzed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A symbol was found
    Decoded(String),
    /// No symbol in this frame; expected on almost every frame
    NotFound,
}

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Select a camera to begin scanning.")]
    NoDeviceSelected,
    #[error("Camera device '{0}' not found")]
    DeviceNotFound(String),
    #[error("Camera permission denied. Grant camera access and try again")]
    PermissionDenied,
    #[error("zbarcam not found. Install zbar-tools to scan with the camera")]
    EngineNotFound,
    #[error("Unable to start camera: {0}")]
    StartFailed(String),
    #[error("Camera did not start within {0:?}")]
    StartTimedOut(Duration),
    #[error("Failed to stop camera: {0}")]
    StopFailed(String),
    #[error(transparent)]
    Torch(#[from] TorchError),
}

/// Errors from flashlight control.
#[derive(Debug, Error)]
pub enum TorchError {
    /// The stream or its video track is gone
    #[error("Video track not found")]
    TrackNotFound,
    #[error("{}", TORCH_UNSUPPORTED_MESSAGE)]
    Unsupported,
    #[error("Torch constraint rejected: {0}")]
    ConstraintRejected(String),
}

impl TorchError {
    /// Whether this failure means the camera has no usable torch at all,
    /// as opposed to a transient rejection.
    pub fn revokes_support(&self) -> bool {
        matches!(self, TorchError::TrackNotFound | TorchError::Unsupported)
    }
}

/// Map an engine's start failure text to a typed error.
pub fn classify_start_error(message: &str) -> CameraError {
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("authorization")
        || lower.contains("not allowed")
    {
        CameraError::PermissionDenied
    } else {
        CameraError::StartFailed(message.trim().to_string())
    }
}
