//! Keyboard-wedge scanner detection.
//!
//! A HID barcode scanner "types" its payload followed by Enter, far faster than
//! a person can. This module provides:
//! - The timing heuristic via [`WedgeDetector`]
//! - Global key capture via [`WedgeListener`]
//! - Focus recovery via [`FocusKeeper`]

mod detector;
mod focus;
mod listener;

pub use detector::{FocusTarget, Key, KeyInput, KeystrokeBuffer, WedgeDetector, WedgeOutcome};
pub use focus::{refocus_if_drifted, FocusKeeper, FocusTracker, GlobalCapture};
pub use listener::{translate_event, WedgeListener};
