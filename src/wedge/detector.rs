//! Timing heuristics that tell a keyboard-wedge scanner apart from a human.

use std::time::{Duration, Instant};

use crate::config::WedgeConfig;

/// A key as seen by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A single printable character
    Char(char),
    /// Enter / Return
    Enter,
    /// Modifiers, arrows, function keys and anything else without text
    Other,
}

/// Where keyboard focus was when a key arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusTarget {
    /// Nothing in particular is focused
    Body,
    /// The dedicated invisible capture target
    CaptureElement,
    /// A single-line text field
    TextInput,
    /// A multi-line text field
    TextArea,
    /// Any other editable surface
    ContentEditable,
    /// A non-editable control (button, list, ...)
    Other,
}

impl FocusTarget {
    /// Typing into these belongs to the user, never to the detector.
    pub fn is_editable(self) -> bool {
        matches!(
            self,
            FocusTarget::TextInput | FocusTarget::TextArea | FocusTarget::ContentEditable
        )
    }
}

/// One keydown event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub target: FocusTarget,
    pub at: Instant,
}

impl KeyInput {
    pub fn new(key: Key, target: FocusTarget, at: Instant) -> Self {
        Self { key, target, at }
    }
}

/// Result of feeding one key to the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WedgeOutcome {
    /// The key was filtered out or carries no text
    Ignored,
    /// The character joined the current burst
    Buffered,
    /// A burst was accepted as a scan
    Completed(String),
    /// Enter ended a burst that looked human; the burst was dropped
    Rejected,
}

/// Characters of the burst in progress.
#[derive(Debug, Clone, Default)]
pub struct KeystrokeBuffer {
    characters: String,
    len: usize,
    burst_start: Option<Instant>,
    last_char: Option<Instant>,
}

impl KeystrokeBuffer {
    pub fn as_str(&self) -> &str {
        &self.characters
    }

    /// Length in characters, not bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn burst_start(&self) -> Option<Instant> {
        self.burst_start
    }

    pub fn last_char(&self) -> Option<Instant> {
        self.last_char
    }

    fn push(&mut self, c: char, now: Instant) {
        if self.burst_start.is_none() {
            self.burst_start = Some(now);
        }
        self.characters.push(c);
        self.len += 1;
        self.last_char = Some(now);
    }

    fn restart_at(&mut self, now: Instant) {
        self.characters.clear();
        self.len = 0;
        self.burst_start = Some(now);
    }

    fn take(&mut self) -> String {
        let taken = std::mem::take(&mut self.characters);
        self.clear();
        taken
    }

    fn clear(&mut self) {
        self.characters.clear();
        self.len = 0;
        self.burst_start = None;
        self.last_char = None;
    }
}

/// Buffers global keystrokes and decides when a burst is a scan.
#[derive(Debug, Clone)]
pub struct WedgeDetector {
    config: WedgeConfig,
    enabled: bool,
    buffer: KeystrokeBuffer,
}

impl WedgeDetector {
    pub fn new(config: WedgeConfig) -> Self {
        Self {
            enabled: config.enabled,
            config,
            buffer: KeystrokeBuffer::default(),
        }
    }

    pub fn config(&self) -> &WedgeConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Arm or disarm auto-detection. Disarming drops any partial burst.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.buffer.clear();
        }
    }

    pub fn buffer(&self) -> &KeystrokeBuffer {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feed one keydown event.
    pub fn process(&mut self, input: &KeyInput) -> WedgeOutcome {
        if !self.enabled || input.target.is_editable() {
            return WedgeOutcome::Ignored;
        }
        self.process_key(input.key, input.at)
    }

    /// Feed one key, bypassing the focus filter.
    pub fn process_key(&mut self, key: Key, now: Instant) -> WedgeOutcome {
        if !self.enabled {
            return WedgeOutcome::Ignored;
        }

        match key {
            Key::Enter => self.finish_burst(now),
            Key::Char(c) => {
                if let Some(last) = self.buffer.last_char {
                    if now.saturating_duration_since(last) > self.config.inter_char_gap() {
                        log::debug!(
                            "wedge: {}ms gap, discarding {} buffered char(s)",
                            now.saturating_duration_since(last).as_millis(),
                            self.buffer.len()
                        );
                        self.buffer.restart_at(now);
                    }
                }
                self.buffer.push(c, now);

                if self.buffer.len() >= self.config.max_length {
                    log::debug!("wedge: length cap reached, accepting burst");
                    return WedgeOutcome::Completed(self.buffer.take());
                }
                WedgeOutcome::Buffered
            }
            Key::Other => WedgeOutcome::Ignored,
        }
    }

    fn finish_burst(&mut self, now: Instant) -> WedgeOutcome {
        if self.buffer.is_empty() {
            self.buffer.clear();
            return WedgeOutcome::Ignored;
        }

        let len = self.buffer.len();
        let elapsed = self
            .buffer
            .burst_start
            .map(|start| now.saturating_duration_since(start));
        let allowance = self.config.completion_allowance(len);

        let fast_enough = elapsed.is_some_and(|e| e <= allowance);
        if len >= self.config.min_length && fast_enough {
            return WedgeOutcome::Completed(self.buffer.take());
        }

        log::debug!(
            "wedge: rejected burst of {} char(s) after {:?} (allowance {:?})",
            len,
            elapsed.unwrap_or(Duration::MAX),
            allowance
        );
        self.buffer.clear();
        WedgeOutcome::Rejected
    }
}

impl Default for WedgeDetector {
    fn default() -> Self {
        Self::new(WedgeConfig::default())
    }
}
