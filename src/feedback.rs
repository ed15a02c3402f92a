//! Vibration and beep confirmation for completed scans.
//!
//! Feedback is best-effort: every platform failure is logged and swallowed so
//! a missing speaker never blocks a scan from reaching the caller.

use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::config::FeedbackConfig;

/// Sample rate used for synthesized tones.
pub const TONE_SAMPLE_RATE: u32 = 44_100;

/// Errors raised by feedback backends. Never escape [`FeedbackEmitter::emit`].
#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error("ffplay not found. Install FFmpeg to enable the scan tone")]
    PlayerNotFound,
    #[error("Audio playback failed: {0}")]
    Playback(String),
    #[error("Vibration failed: {0}")]
    Vibration(String),
}

/// A short synthesized beep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tone {
    pub frequency_hz: f32,
    pub duration: Duration,
    pub gain: f32,
    pub sample_rate: u32,
}

impl Tone {
    pub fn from_config(config: &FeedbackConfig) -> Self {
        Self {
            frequency_hz: config.tone_frequency_hz,
            duration: Duration::from_millis(config.tone_duration_ms),
            gain: config.tone_gain,
            sample_rate: TONE_SAMPLE_RATE,
        }
    }

    pub fn sample_count(&self) -> usize {
        (self.duration.as_secs_f64() * f64::from(self.sample_rate)).round() as usize
    }

    /// Mono triangle wave starting at zero and rising, scaled by `gain`.
    pub fn samples(&self) -> Vec<f32> {
        let rate = f64::from(self.sample_rate);
        let freq = f64::from(self.frequency_hz);
        (0..self.sample_count())
            .map(|i| {
                let phase = (i as f64 * freq / rate).fract();
                (triangle(phase) * f64::from(self.gain)) as f32
            })
            .collect()
    }
}

fn triangle(phase: f64) -> f64 {
    if phase < 0.25 {
        4.0 * phase
    } else if phase < 0.75 {
        2.0 - 4.0 * phase
    } else {
        4.0 * phase - 4.0
    }
}

/// Device vibration motor.
pub trait Vibrator: Send {
    fn vibrate(&mut self, duration: Duration) -> Result<(), FeedbackError>;
}

/// Playback state of an audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Running,
    /// Parked by the platform, typically after long inactivity
    Suspended,
    Closed,
}

/// A long-lived audio output that can play tones.
pub trait AudioContext: Send {
    fn state(&self) -> AudioState;
    fn resume(&mut self) -> Result<(), FeedbackError>;
    fn play(&mut self, tone: &Tone) -> Result<(), FeedbackError>;
}

/// Creates the audio context on first use.
pub type AudioContextFactory =
    Box<dyn Fn() -> Result<Box<dyn AudioContext>, FeedbackError> + Send + Sync>;

/// Confirms a completed scan with a short vibration and a beep.
pub struct FeedbackEmitter {
    config: FeedbackConfig,
    vibrator: Mutex<Option<Box<dyn Vibrator>>>,
    audio: Mutex<Option<Box<dyn AudioContext>>>,
    audio_factory: Option<AudioContextFactory>,
}

impl std::fmt::Debug for FeedbackEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackEmitter")
            .field("config", &self.config)
            .field("has_audio_factory", &self.audio_factory.is_some())
            .finish_non_exhaustive()
    }
}

impl FeedbackEmitter {
    pub fn new(config: FeedbackConfig) -> Self {
        Self {
            config,
            vibrator: Mutex::new(None),
            audio: Mutex::new(None),
            audio_factory: None,
        }
    }

    /// An emitter that does nothing at all.
    pub fn silent() -> Self {
        Self::new(FeedbackConfig {
            vibrate: false,
            tone: false,
            ..FeedbackConfig::default()
        })
    }

    pub fn with_vibrator(self, vibrator: Box<dyn Vibrator>) -> Self {
        *lock(&self.vibrator) = Some(vibrator);
        self
    }

    pub fn with_audio(mut self, factory: AudioContextFactory) -> Self {
        self.audio_factory = Some(factory);
        self
    }

    /// Vibrate and beep. Never fails.
    pub fn emit(&self) {
        if self.config.vibrate {
            self.vibrate();
        }
        if self.config.tone {
            self.beep();
        }
    }

    fn vibrate(&self) {
        let mut vibrator = lock(&self.vibrator);
        let Some(vibrator) = vibrator.as_mut() else {
            return;
        };
        if let Err(e) = vibrator.vibrate(Duration::from_millis(self.config.vibrate_ms)) {
            log::debug!("Vibration not supported: {}", e);
        }
    }

    fn beep(&self) {
        let Some(factory) = self.audio_factory.as_ref() else {
            return;
        };

        let mut slot = lock(&self.audio);
        if slot.is_none() {
            match factory() {
                Ok(ctx) => *slot = Some(ctx),
                Err(e) => {
                    log::debug!("Unable to create audio context: {}", e);
                    return;
                }
            }
        }
        let Some(ctx) = slot.as_mut() else {
            return;
        };

        if ctx.state() == AudioState::Suspended {
            if let Err(e) = ctx.resume() {
                log::debug!("Unable to resume audio context: {}", e);
            }
        }
        if let Err(e) = ctx.play(&Tone::from_config(&self.config)) {
            log::debug!("Unable to play scan tone: {}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Plays tones by piping raw PCM into `ffplay`.
#[derive(Debug, Default)]
pub struct FfplayAudio;

impl FfplayAudio {
    /// Check that `ffplay` is installed.
    pub fn open() -> Result<Self, FeedbackError> {
        let status = Command::new("ffplay")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(s) if s.success() => Ok(Self),
            Ok(s) => Err(FeedbackError::Playback(format!("ffplay exited with {}", s))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FeedbackError::PlayerNotFound),
            Err(e) => Err(FeedbackError::Playback(e.to_string())),
        }
    }

    /// Factory suitable for [`FeedbackEmitter::with_audio`].
    pub fn factory() -> AudioContextFactory {
        Box::new(|| Ok(Box::new(FfplayAudio::open()?) as Box<dyn AudioContext>))
    }
}

impl AudioContext for FfplayAudio {
    fn state(&self) -> AudioState {
        AudioState::Running
    }

    fn resume(&mut self) -> Result<(), FeedbackError> {
        Ok(())
    }

    /// Hands the tone to a background thread; spawning the player and
    /// writing the PCM never run on the caller's thread.
    fn play(&mut self, tone: &Tone) -> Result<(), FeedbackError> {
        let rate = tone.sample_rate.to_string();
        let mut command = Command::new("ffplay");
        command.args([
            "-nodisp", "-autoexit", "-loglevel", "quiet", "-f", "f32le", "-ar", &rate,
            "-ch_layout", "mono", "-i", "-",
        ]);
        let pcm = pcm_bytes(tone);

        std::thread::Builder::new()
            .name("scan-tone".to_string())
            .spawn(move || {
                if let Err(e) = pipe_to_player(command, &pcm) {
                    log::debug!("Unable to play scan tone: {}", e);
                }
            })
            .map_err(|e| FeedbackError::Playback(e.to_string()))?;
        Ok(())
    }
}

/// Little-endian f32 PCM for `tone`.
fn pcm_bytes(tone: &Tone) -> Vec<u8> {
    tone.samples().iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Spawn `command`, feed `pcm` to its stdin and wait for it to exit.
/// The child is reaped on every path.
fn pipe_to_player(mut command: Command, pcm: &[u8]) -> Result<ExitStatus, FeedbackError> {
    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| FeedbackError::Playback(e.to_string()))?;

    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(pcm),
        None => Ok(()),
    };
    if let Err(e) = written {
        let _ = child.kill();
        let _ = child.wait();
        return Err(FeedbackError::Playback(e.to_string()));
    }

    child
        .wait()
        .map_err(|e| FeedbackError::Playback(e.to_string()))
}
