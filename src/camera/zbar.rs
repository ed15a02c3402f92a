//! Decode engine backed by the `zbarcam` command-line scanner.
//!
//! zbarcam opens a V4L2 device, decodes every frame itself and prints one line
//! per symbol found. Frames without a symbol produce no output, so this engine
//! never reports [`FrameOutcome::NotFound`].

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::engine::{DecodeEngine, FrameSender, TorchController};
use super::types::{classify_start_error, CameraError, DecodeSettings, FrameOutcome};

/// How long zbarcam gets to fail on a bad device before the start counts as attached.
const ATTACH_GRACE: Duration = Duration::from_millis(300);

/// Runs `zbarcam --raw --nodisplay <device>` for one session.
#[derive(Debug, Default)]
pub struct ZbarcamEngine {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl ZbarcamEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory suitable for [`crate::camera::OpticalChannel::new`].
    pub fn factory() -> Arc<dyn super::engine::EngineFactory> {
        Arc::new(|| Box::new(ZbarcamEngine::new()) as Box<dyn DecodeEngine>)
    }
}

#[async_trait]
impl DecodeEngine for ZbarcamEngine {
    async fn start(
        &mut self,
        device_id: &str,
        settings: &DecodeSettings,
        frames: FrameSender,
    ) -> Result<(), CameraError> {
        log::debug!("zbarcam: opening {} (target {} fps)", device_id, settings.fps);

        let mut child = Command::new("zbarcam")
            .args(["--raw", "--nodisplay", device_id])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CameraError::EngineNotFound
                } else {
                    CameraError::StartFailed(e.to_string())
                }
            })?;

        // A missing or busy device makes zbarcam exit almost immediately.
        if let Ok(waited) = tokio::time::timeout(ATTACH_GRACE, child.wait()).await {
            let status = waited.map_err(|e| CameraError::StartFailed(e.to_string()))?;
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                if let Err(e) = pipe.read_to_string(&mut stderr).await {
                    log::debug!("zbarcam: unreadable stderr: {}", e);
                }
            }
            if stderr.trim().is_empty() {
                return Err(CameraError::StartFailed(format!("zbarcam exited with {}", status)));
            }
            return Err(classify_start_error(&stderr));
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::StartFailed("zbarcam stdout unavailable".to_string()))?;

        // zbarcam keeps writing diagnostics; an undrained pipe would stall it.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_lines(stderr));
        }

        self.reader = Some(tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if frames.send(FrameOutcome::Decoded(line)).is_err() {
                    break;
                }
            }
        }));
        self.child = Some(child);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), CameraError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(());
        };
        match child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => child
                .kill()
                .await
                .map_err(|e| CameraError::StopFailed(e.to_string())),
        }
    }

    fn clear(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.child = None;
    }

    fn torch(&self) -> Option<Arc<dyn TorchController>> {
        None
    }
}

/// Forward every line of `reader` to the debug log until EOF. Returns the
/// number of lines seen.
async fn log_lines<R: AsyncRead + Unpin>(reader: R) -> usize {
    let mut lines = BufReader::new(reader).lines();
    let mut count = 0;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                count += 1;
                log::debug!("zbarcam: {}", line);
            }
            Ok(None) => break,
            Err(e) => {
                log::debug!("zbarcam: stderr closed: {}", e);
                break;
            }
        }
    }
    count
}
