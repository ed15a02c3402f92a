//! Camera discovery and default-device selection.
//!
//! Discovery never fails outright: every problem becomes a human-readable
//! message on the returned [`DeviceEnumeration`] and an empty device list.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Label keywords that identify a rear-facing camera.
const REAR_CAMERA_KEYWORDS: [&str; 3] = ["back", "rear", "environment"];

/// An available video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    /// May be empty before camera permission is granted
    pub label: String,
}

impl CameraDevice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

impl fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.label.is_empty() {
            return f.write_str(&self.label);
        }
        let chars: Vec<char> = self.id.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        write!(f, "Camera {}", tail)
    }
}

/// Errors from a platform's media-device API.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("FFmpeg not found. Please install it to list cameras")]
    FfmpegNotFound,
    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),
}

/// Platform camera API.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether the platform can enumerate devices at all.
    fn enumeration_supported(&self) -> bool {
        true
    }

    /// Briefly open any camera so device labels become visible, then release it.
    async fn request_permission(&self) -> Result<(), DeviceError>;

    async fn enumerate_video_inputs(&self) -> Result<Vec<CameraDevice>, DeviceError>;

    /// Whether the platform knows the torch constraint at all, independent of
    /// any particular device.
    fn supports_torch(&self) -> bool;
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceEnumeration {
    pub devices: Vec<CameraDevice>,
    pub default_device: Option<String>,
    pub torch_supported: bool,
    pub error: Option<String>,
}

impl DeviceEnumeration {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Pick the camera to scan with: a rear-facing one by label, else the last
/// of several, else the only one.
pub fn select_default_device(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    let rear = devices.iter().find(|d| {
        let label = d.label.to_lowercase();
        REAR_CAMERA_KEYWORDS.iter().any(|k| label.contains(k))
    });
    rear.or_else(|| {
        if devices.len() > 1 {
            devices.last()
        } else {
            devices.first()
        }
    })
}

/// Request permission, list cameras, choose a default and record torch support.
pub async fn discover(media: &dyn MediaDevices) -> DeviceEnumeration {
    if !media.enumeration_supported() {
        return DeviceEnumeration::failed("Camera enumeration not supported on this platform.");
    }

    if let Err(e) = media.request_permission().await {
        log::debug!("Camera permission not granted yet: {}", e);
    }

    let devices = match media.enumerate_video_inputs().await {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("Camera enumeration failed: {}", e);
            return DeviceEnumeration::failed(e.to_string());
        }
    };

    let torch_supported = media.supports_torch();
    if devices.is_empty() {
        return DeviceEnumeration {
            torch_supported,
            error: Some("No cameras detected.".to_string()),
            ..DeviceEnumeration::default()
        };
    }

    let default_device = select_default_device(&devices).map(|d| d.id.clone());
    DeviceEnumeration {
        devices,
        default_device,
        torch_supported,
        error: None,
    }
}

/// Linux cameras via the V4L2 sysfs tree.
#[derive(Debug, Clone)]
pub struct V4l2Devices {
    sysfs_root: PathBuf,
}

impl Default for V4l2Devices {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys/class/video4linux"),
        }
    }
}

impl V4l2Devices {
    /// Read devices from a different sysfs root (used by tests).
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_root: root.into(),
        }
    }
}

#[async_trait]
impl MediaDevices for V4l2Devices {
    async fn request_permission(&self) -> Result<(), DeviceError> {
        // V4L2 labels are readable without opening a stream.
        Ok(())
    }

    async fn enumerate_video_inputs(&self) -> Result<Vec<CameraDevice>, DeviceError> {
        read_v4l2_devices(&self.sysfs_root)
    }

    fn supports_torch(&self) -> bool {
        false
    }
}

/// List capture `videoN` entries under `root`, ordered by N.
///
/// UVC webcams expose a metadata node next to each capture node; only the
/// node with `index` 0 carries frames. A missing `index` counts as 0.
pub fn read_v4l2_devices(root: &Path) -> Result<Vec<CameraDevice>, DeviceError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(DeviceError::PermissionDenied)
        }
        Err(e) => return Err(DeviceError::QueryFailed(e.to_string())),
    };

    let mut found: Vec<(u32, CameraDevice)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let node = entry.file_name().to_string_lossy().to_string();
            let index: u32 = node.strip_prefix("video")?.parse().ok()?;
            if !is_capture_node(&entry.path()) {
                log::debug!("skipping non-capture node {}", node);
                return None;
            }
            let label = std::fs::read_to_string(entry.path().join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            Some((index, CameraDevice::new(format!("/dev/{}", node), label)))
        })
        .collect();
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, device)| device).collect())
}

fn is_capture_node(node: &Path) -> bool {
    match std::fs::read_to_string(node.join("index")) {
        Ok(index) => index.trim() == "0",
        Err(_) => true,
    }
}

/// macOS cameras via FFmpeg's AVFoundation device listing.
#[derive(Debug, Clone, Default)]
pub struct AvFoundationDevices;

#[async_trait]
impl MediaDevices for AvFoundationDevices {
    async fn request_permission(&self) -> Result<(), DeviceError> {
        // Listing devices through AVFoundation triggers the permission prompt.
        run_avfoundation_listing().await.map(|_| ())
    }

    async fn enumerate_video_inputs(&self) -> Result<Vec<CameraDevice>, DeviceError> {
        let stderr = run_avfoundation_listing().await?;
        Ok(parse_avfoundation_video_devices(&stderr))
    }

    fn supports_torch(&self) -> bool {
        false
    }
}

async fn run_avfoundation_listing() -> Result<String, DeviceError> {
    let output = Command::new("ffmpeg")
        .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeviceError::FfmpegNotFound
            } else {
                DeviceError::QueryFailed(format!("Failed to run ffmpeg: {}", e))
            }
        })?;
    // FFmpeg writes the device list to stderr
    Ok(String::from_utf8_lossy(&output.stderr).to_string())
}

/// Parse the video section of FFmpeg's AVFoundation device listing.
/// Screen-capture pseudo devices are skipped.
pub fn parse_avfoundation_video_devices(stderr: &str) -> Vec<CameraDevice> {
    let mut devices = Vec::new();
    let mut in_video_section = false;

    for line in stderr.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video_section = true;
            continue;
        }
        if line.contains("AVFoundation audio devices:") {
            break;
        }
        if !in_video_section {
            continue;
        }
        if let Some((index, name)) = parse_device_line(line) {
            if !name.starts_with("Capture screen") {
                devices.push(CameraDevice::new(index.to_string(), name));
            }
        }
    }

    devices
}

/// Parse `[AVFoundation indev @ 0x...] [index] device name`.
fn parse_device_line(line: &str) -> Option<(usize, String)> {
    let bracket_idx = line.find("] [")?;
    let after_bracket = &line[bracket_idx + 3..];
    let close_bracket = after_bracket.find(']')?;
    let index: usize = after_bracket[..close_bracket].parse().ok()?;
    let name = after_bracket.get(close_bracket + 2..)?.trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some((index, name))
}

/// The media-device backend for the current platform.
pub fn platform_devices() -> Box<dyn MediaDevices> {
    if cfg!(target_os = "macos") {
        Box::new(AvFoundationDevices)
    } else {
        Box::new(V4l2Devices::default())
    }
}
