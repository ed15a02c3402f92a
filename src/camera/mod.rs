//! Camera-based barcode scanning.
//!
//! This module provides the optical scan channel:
//! - Session lifecycle via [`OpticalChannel`]
//! - Decoder and flashlight seams via [`DecodeEngine`] and [`TorchController`]
//! - A zbarcam-backed engine via [`ZbarcamEngine`]

mod channel;
mod engine;
mod types;
mod zbar;

pub use channel::OpticalChannel;
pub use engine::{DecodeEngine, EngineFactory, FrameSender, TorchController};
pub use types::{
    classify_start_error, CameraError, DecodeSettings, FrameOutcome, SessionState, TorchError,
    TorchState, CAMERA_STOPPED_MESSAGE, TORCH_UNSUPPORTED_MESSAGE,
};
pub use zbar::ZbarcamEngine;
