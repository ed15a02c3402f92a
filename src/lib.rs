//! shop-scanner library crate.
//!
//! Unified barcode/QR input for a retail counter: live camera decoding and
//! HID keyboard-wedge scanners both feed one "scan completed" callback.
//!
//! ```text
//!  camera ──▶ OpticalChannel ─┐
//!                             ├──▶ ScanUnifier ──▶ feedback + ScanObserver
//!  keys ───▶ WedgeDetector ───┘
//! ```

pub mod camera;
pub mod cli;
pub mod config;
pub mod devices;
pub mod feedback;
pub mod scanner;
pub mod unifier;
pub mod wedge;

pub use config::Config;
pub use scanner::{KeyRouter, UnifiedScanner};
pub use unifier::{ScanObserver, ScanResult, ScanSource, ScanStatus, ScanUnifier};
