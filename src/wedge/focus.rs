//! Keeps keystroke capture alive when focus drifts away.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::detector::FocusTarget;

/// Host-side view of keyboard focus.
pub trait FocusTracker: Send + Sync {
    /// What currently holds focus; `None` when nothing does.
    fn active_target(&self) -> Option<FocusTarget>;

    /// Move focus to the invisible capture target. Returns `false` if the
    /// target no longer exists.
    fn focus_capture(&self) -> bool;
}

/// Tracker for OS-level capture, where the listener sees every keystroke and
/// there is no focus to lose.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalCapture;

impl FocusTracker for GlobalCapture {
    fn active_target(&self) -> Option<FocusTarget> {
        Some(FocusTarget::CaptureElement)
    }

    fn focus_capture(&self) -> bool {
        true
    }
}

/// Refocus the capture target if focus sits on the body or nowhere.
/// Returns whether a refocus was requested.
pub fn refocus_if_drifted(tracker: &dyn FocusTracker) -> bool {
    match tracker.active_target() {
        None | Some(FocusTarget::Body) => {
            if !tracker.focus_capture() {
                log::debug!("focus: capture target unavailable");
            }
            true
        }
        Some(_) => false,
    }
}

/// Floor for the refocus period; `tokio::time::interval` rejects zero.
const MIN_REFOCUS_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic focus recovery task. Aborted on `stop()` or drop.
#[derive(Debug)]
pub struct FocusKeeper {
    task: Option<JoinHandle<()>>,
}

impl FocusKeeper {
    /// Focus the capture target now, then check every `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(tracker: Arc<dyn FocusTracker>, interval: Duration) -> Self {
        tracker.focus_capture();

        let interval = interval.max(MIN_REFOCUS_INTERVAL);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately; the initial focus already happened.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                refocus_if_drifted(tracker.as_ref());
            }
        });

        Self { task: Some(task) }
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for FocusKeeper {
    fn drop(&mut self) {
        self.stop();
    }
}
