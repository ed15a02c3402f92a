//! Configuration file handling for shop-scanner.
//!
//! Loads configuration from `~/.config/shop-scanner/config.toml` or a custom path.
//! Every timing heuristic of the keystroke-wedge detector lives here so it can be
//! recalibrated against real scanner hardware without a rebuild.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file structure for shop-scanner.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub wedge: WedgeConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
}

/// Tunables for HID keyboard-wedge detection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WedgeConfig {
    /// Start with auto-detection armed
    pub enabled: bool,
    /// Largest gap between two characters of one burst
    pub inter_char_gap_ms: u64,
    /// Shortest burst accepted on Enter
    pub min_length: usize,
    /// Burst length accepted immediately without Enter
    pub max_length: usize,
    /// Floor of the Enter-completion time allowance
    pub min_window_ms: u64,
    /// Per-character share of the Enter-completion time allowance
    pub per_char_budget_ms: u64,
}

impl Default for WedgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inter_char_gap_ms: 60,
            min_length: 6,
            max_length: 48,
            min_window_ms: 300,
            per_char_budget_ms: 60,
        }
    }
}

impl WedgeConfig {
    pub fn inter_char_gap(&self) -> Duration {
        Duration::from_millis(self.inter_char_gap_ms)
    }

    /// Total time a burst of `len` characters may take from its first
    /// character to the terminating Enter.
    pub fn completion_allowance(&self, len: usize) -> Duration {
        let per_char = Duration::from_millis(self.per_char_budget_ms)
            .saturating_mul(u32::try_from(len).unwrap_or(u32::MAX));
        per_char.max(Duration::from_millis(self.min_window_ms))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Preferred device id; overrides the rear-camera default when present
    pub device: Option<String>,
    /// Frames per second requested from the decode engine
    pub fps: u32,
    /// Give up on a hung camera start after this long
    pub start_timeout_ms: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            fps: 12,
            start_timeout_ms: None,
        }
    }
}

impl CameraConfig {
    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeedbackConfig {
    pub vibrate: bool,
    pub vibrate_ms: u64,
    pub tone: bool,
    pub tone_frequency_hz: f32,
    pub tone_duration_ms: u64,
    pub tone_gain: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            vibrate: true,
            vibrate_ms: 100,
            tone: true,
            tone_frequency_hz: 880.0,
            tone_duration_ms: 180,
            tone_gain: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FocusConfig {
    pub refocus_interval_ms: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            refocus_interval_ms: 2000,
        }
    }
}

impl FocusConfig {
    pub fn refocus_interval(&self) -> Duration {
        Duration::from_millis(self.refocus_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Drop keyboard-wedge completions while the camera is scanning
    pub exclusive_channels: bool,
}

impl Config {
    /// Load configuration from a file path.
    /// Returns default config if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        config
            .validate()
            .map_err(|reason| ConfigError::Invalid { path, reason })?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.wedge;
        if w.min_length == 0 {
            return Err("wedge.min_length must be at least 1".to_string());
        }
        if w.max_length < w.min_length {
            return Err(format!(
                "wedge.max_length ({}) must not be below wedge.min_length ({})",
                w.max_length, w.min_length
            ));
        }
        if w.inter_char_gap_ms == 0 {
            return Err("wedge.inter_char_gap_ms must be greater than 0".to_string());
        }
        if self.focus.refocus_interval_ms == 0 {
            return Err("focus.refocus_interval_ms must be greater than 0".to_string());
        }
        if self.camera.fps == 0 {
            return Err("camera.fps must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.feedback.tone_gain) {
            return Err(format!(
                "feedback.tone_gain must be between 0.0 and 1.0, got {}",
                self.feedback.tone_gain
            ));
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", path.display())]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid config file '{}': {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("shop-scanner").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/shop-scanner/config.toml")
        })
}

/// Commented default file written by `config init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# shop-scanner configuration

[wedge]
# Detect HID keyboard-wedge scanners from global keystrokes
enabled = true
# Characters further apart than this start a new burst
inter_char_gap_ms = 60
# Shortest burst accepted when Enter arrives
min_length = 6
# Bursts reaching this length complete without Enter
max_length = 48
# Enter must arrive within max(min_window_ms, length * per_char_budget_ms)
min_window_ms = 300
per_char_budget_ms = 60

[camera]
# Preferred device id (default: rear-facing camera, else the last one)
# device = "/dev/video0"
fps = 12
# Abort a hung camera start (default: wait indefinitely)
# start_timeout_ms = 10000

[feedback]
vibrate = true
vibrate_ms = 100
tone = true
tone_frequency_hz = 880.0
tone_duration_ms = 180
tone_gain = 0.1

[focus]
refocus_interval_ms = 2000

[scanner]
# Ignore keyboard-wedge scans while the camera is scanning
exclusive_channels = false
"#;
