//! Subcommand handlers for listen, list-cameras and config actions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::args::{ConfigAction, ListenArgs};
use crate::camera::{SessionState, ZbarcamEngine};
use crate::config::{Config, ConfigError, DEFAULT_CONFIG_TOML};
use crate::devices::{discover, platform_devices, MediaDevices};
use crate::feedback::{FeedbackEmitter, FfplayAudio};
use crate::scanner::UnifiedScanner;
use crate::unifier::{ScanObserver, ScanStatus};
use crate::wedge::GlobalCapture;

/// How often `listen` checks for Ctrl+C and re-arms the camera.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Errors surfaced by subcommands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),
    #[error("Failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to install Ctrl+C handler: {0}")]
    CtrlC(#[from] ctrlc::Error),
    #[error("{0}")]
    Discovery(String),
}

/// Check if Ctrl+C was received.
pub fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler. Call once, before `listen`.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Prints each completed scan on stdout, one code per line.
#[derive(Debug, Default)]
pub struct PrintObserver {
    scans: AtomicUsize,
    camera_failed: AtomicBool,
}

impl PrintObserver {
    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    /// True once any error has been reported since the last clear.
    pub fn has_failed(&self) -> bool {
        self.camera_failed.load(Ordering::SeqCst)
    }
}

impl ScanObserver for PrintObserver {
    fn on_scan_completed(&self, code: &str) {
        self.scans.fetch_add(1, Ordering::SeqCst);
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", code);
        let _ = stdout.flush();
    }

    fn on_status_changed(&self, status: ScanStatus) {
        log::info!("scanner status: {:?}", status);
    }

    fn on_error(&self, message: Option<&str>) {
        match message {
            Some(message) => {
                self.camera_failed.store(true, Ordering::SeqCst);
                eprintln!("Error: {}", message);
            }
            None => self.camera_failed.store(false, Ordering::SeqCst),
        }
    }
}

/// Run the scanner until Ctrl+C.
///
/// Keyboard-wedge scans work without a camera. With `--camera` the camera is
/// re-armed after every decode until it reports an error.
pub async fn listen(options: &ListenArgs, mut config: Config) -> Result<(), CommandError> {
    if let Some(device) = &options.device {
        config.camera.device = Some(device.clone());
    }
    let requested_device = config.camera.device.clone();

    let feedback =
        FeedbackEmitter::new(config.feedback.clone()).with_audio(FfplayAudio::factory());
    let observer = Arc::new(PrintObserver::default());
    let mut scanner = UnifiedScanner::new(
        config,
        observer.clone(),
        ZbarcamEngine::factory(),
        feedback,
    );
    if options.no_auto_detect {
        scanner.set_auto_detect(false);
    }

    let media = platform_devices();
    let enumeration = scanner.mount(media.as_ref(), Arc::new(GlobalCapture)).await;
    log::info!("found {} camera(s)", enumeration.devices.len());
    if let Some(requested) = requested_device {
        if scanner.selected_device() != Some(requested.as_str()) {
            log::warn!("Camera '{}' not found, using the default camera", requested);
        }
    }

    if scanner.auto_detect() {
        if let Err(e) = scanner.attach_global_keyboard() {
            log::warn!("Keyboard-wedge capture unavailable: {}", e);
        }
    }

    if options.camera {
        if let Some(device) = scanner.selected_device() {
            eprintln!("Scanning with camera {}", device);
        }
        let _ = scanner.start_camera().await;
    }

    eprintln!("Listening for scans. Press Ctrl+C to quit.");
    let mut poll = tokio::time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    while !ctrlc_received() {
        poll.tick().await;
        if options.camera && scanner.camera_state() == SessionState::Idle && !observer.has_failed()
        {
            let _ = scanner.start_camera().await;
        }
    }

    scanner.unmount().await;
    log::info!("{} scan(s) completed", observer.scan_count());
    Ok(())
}

/// List available cameras and print them to stdout.
pub async fn list_cameras(media: &dyn MediaDevices) -> Result<(), CommandError> {
    let enumeration = discover(media).await;
    if let Some(message) = enumeration.error {
        if enumeration.devices.is_empty() && message != "No cameras detected." {
            return Err(CommandError::Discovery(message));
        }
        println!("No cameras found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
        return Ok(());
    }

    println!("Available cameras:");
    for device in &enumeration.devices {
        let marker = if enumeration.default_device.as_deref() == Some(device.id.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  {}  {}{}", device.id, device, marker);
    }
    println!();
    println!("Use --device <id> to select a camera.");
    Ok(())
}

/// Convenience wrapper used by `main` for the current platform.
pub async fn list_platform_cameras() -> Result<(), CommandError> {
    let media = platform_devices();
    list_cameras(media.as_ref()).await
}

/// Human-readable summary of the effective configuration.
pub fn describe_config(config: &Config, config_path: &Path) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let w = &config.wedge;
    let c = &config.camera;
    let f = &config.feedback;

    let mut out = String::from("Current configuration:\n");
    out.push_str(&format!("  Auto-detect wedge scanners: {}\n", yes_no(w.enabled)));
    out.push_str(&format!(
        "  Wedge timing: gap {}ms, length {}..={}, window max({}ms, {}ms/char)\n",
        w.inter_char_gap_ms, w.min_length, w.max_length, w.min_window_ms, w.per_char_budget_ms
    ));
    out.push_str(&format!(
        "  Camera: {} at {} fps\n",
        c.device.as_deref().unwrap_or("default"),
        c.fps
    ));
    match c.start_timeout_ms {
        Some(ms) => out.push_str(&format!("  Camera start timeout: {}ms\n", ms)),
        None => out.push_str("  Camera start timeout: none\n"),
    }
    out.push_str(&format!(
        "  Vibrate: {} ({}ms)\n",
        yes_no(f.vibrate),
        f.vibrate_ms
    ));
    out.push_str(&format!(
        "  Tone: {} ({}Hz, {}ms, gain {})\n",
        yes_no(f.tone),
        f.tone_frequency_hz,
        f.tone_duration_ms,
        f.tone_gain
    ));
    out.push_str(&format!(
        "  Refocus interval: {}ms\n",
        config.focus.refocus_interval_ms
    ));
    out.push_str(&format!(
        "  Exclusive channels: {}\n",
        yes_no(config.scanner.exclusive_channels)
    ));
    out.push('\n');

    let status = if config_path.exists() { "exists" } else { "not found" };
    out.push_str(&format!("Config file: {} ({})\n", config_path.display(), status));
    out
}

/// Write the commented default config to `config_path`. Never overwrites.
pub fn init_config(config_path: &Path) -> Result<(), CommandError> {
    if config_path.exists() {
        return Err(CommandError::ConfigExists(config_path.to_path_buf()));
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CommandError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    std::fs::write(config_path, DEFAULT_CONFIG_TOML).map_err(|e| CommandError::Write {
        path: config_path.to_path_buf(),
        source: e,
    })
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, config_path: &Path) -> Result<(), CommandError> {
    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(config_path))?;
            print!("{}", describe_config(&config, config_path));
        }
        ConfigAction::Init => {
            init_config(config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}
