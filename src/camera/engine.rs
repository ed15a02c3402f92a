//! Seams to the optical decoding engine and the camera's flashlight.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::types::{CameraError, DecodeSettings, FrameOutcome, TorchError};

/// Where an engine reports analyzed frames.
pub type FrameSender = UnboundedSender<FrameOutcome>;

/// An external barcode/QR decoder bound to one camera stream.
///
/// One engine instance serves one session: it is started once, stopped,
/// then cleared and dropped.
#[async_trait]
pub trait DecodeEngine: Send {
    /// Open `device_id` and begin analyzing frames into `frames`.
    async fn start(
        &mut self,
        device_id: &str,
        settings: &DecodeSettings,
        frames: FrameSender,
    ) -> Result<(), CameraError>;

    /// Halt decoding and release the camera stream.
    async fn stop(&mut self) -> Result<(), CameraError>;

    /// Release everything else the engine holds, including its frame sender.
    fn clear(&mut self);

    /// Flashlight of the active stream's video track, if one is reachable.
    fn torch(&self) -> Option<Arc<dyn TorchController>>;
}

/// Capability-checked flashlight control.
#[async_trait]
pub trait TorchController: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn set(&self, enabled: bool) -> Result<(), TorchError>;
}

/// Creates a fresh engine for every camera session.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Box<dyn DecodeEngine>;
}

impl<F> EngineFactory for F
where
    F: Fn() -> Box<dyn DecodeEngine> + Send + Sync,
{
    fn create(&self) -> Box<dyn DecodeEngine> {
        self()
    }
}
