//! Global keystroke capture for the keyboard-wedge detector.
//!
//! Uses rdev for cross-platform global key listening, so keystrokes are seen
//! no matter which window or field has focus.
//!
//! rdev's `listen()` cannot be unregistered, so one hook thread serves the
//! whole process. It forwards into a shared sink slot; attaching fills the
//! slot and detaching empties it, and repeated mounts reuse the same thread.

use rdev::{listen, Event, EventType, Key as RdevKey};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

use super::detector::{FocusTarget, Key, KeyInput};
use super::focus::FocusTracker;

/// Where the hook thread currently delivers keys.
struct KeySink {
    id: u64,
    keys: UnboundedSender<KeyInput>,
    focus: Arc<dyn FocusTracker>,
}

static SINK: Mutex<Option<KeySink>> = Mutex::new(None);
static HOOK_THREAD: Mutex<Option<JoinHandle<()>>> = Mutex::new(None);
static HOOK_SPAWNS: AtomicUsize = AtomicUsize::new(0);
static NEXT_SINK_ID: AtomicU64 = AtomicU64::new(1);

type HookSpawner = fn() -> std::io::Result<JoinHandle<()>>;

/// Owns the global key sink for the lifetime of a mounted scanner.
pub struct WedgeListener {
    id: u64,
}

impl std::fmt::Debug for WedgeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WedgeListener")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl WedgeListener {
    /// Start forwarding global keydown events to `keys`.
    ///
    /// `focus` is consulted on every event so keys typed into editable
    /// fields can be filtered downstream. A later attach takes the sink over
    /// from any earlier listener.
    pub fn attach(
        keys: UnboundedSender<KeyInput>,
        focus: Arc<dyn FocusTracker>,
    ) -> std::io::Result<Self> {
        Self::attach_with(keys, focus, spawn_rdev_hook)
    }

    fn attach_with(
        keys: UnboundedSender<KeyInput>,
        focus: Arc<dyn FocusTracker>,
        spawn: HookSpawner,
    ) -> std::io::Result<Self> {
        ensure_hook(spawn)?;

        let id = NEXT_SINK_ID.fetch_add(1, Ordering::SeqCst);
        *lock(&SINK) = Some(KeySink { id, keys, focus });
        log::debug!("wedge listener {} attached", id);
        Ok(Self { id })
    }

    /// Stop forwarding keys here. The sender and focus tracker are released.
    pub fn detach(&mut self) {
        let mut sink = lock(&SINK);
        if sink.as_ref().is_some_and(|s| s.id == self.id) {
            *sink = None;
            log::debug!("wedge listener {} detached", self.id);
        }
    }

    pub fn is_attached(&self) -> bool {
        lock(&SINK).as_ref().is_some_and(|s| s.id == self.id)
    }
}

impl Drop for WedgeListener {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Start the process-wide hook thread unless it already runs.
fn ensure_hook(spawn: HookSpawner) -> std::io::Result<()> {
    let mut hook = lock(&HOOK_THREAD);
    if hook.is_none() {
        *hook = Some(spawn()?);
        HOOK_SPAWNS.fetch_add(1, Ordering::SeqCst);
    }
    Ok(())
}

fn spawn_rdev_hook() -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("wedge-listener".to_string())
        .spawn(|| {
            // Blocks until error. On macOS this requires Accessibility permission.
            if let Err(e) = listen(|event: Event| {
                if let Some(key) = translate_event(&event) {
                    forward(key, Instant::now());
                }
            }) {
                log::error!("Keyboard listener error: {:?}", e);
            }
        })
}

/// Deliver one key to the attached sink. Returns whether anyone received it.
fn forward(key: Key, at: Instant) -> bool {
    let mut sink = lock(&SINK);
    let Some(current) = sink.as_ref() else {
        return false;
    };
    let target = current.focus.active_target().unwrap_or(FocusTarget::Body);
    if current.keys.send(KeyInput::new(key, target, at)).is_err() {
        // Receiver gone: the scanner was unmounted without detaching.
        *sink = None;
        return false;
    }
    true
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Map a raw rdev event to a detector key. Releases and mouse events map to `None`.
pub fn translate_event(event: &Event) -> Option<Key> {
    match event.event_type {
        EventType::KeyPress(RdevKey::Return) | EventType::KeyPress(RdevKey::KpReturn) => {
            Some(Key::Enter)
        }
        EventType::KeyPress(_) => Some(text_key(event.name.as_deref())),
        _ => None,
    }
}

/// A key counts as a character only when it produced exactly one printable char.
fn text_key(name: Option<&str>) -> Key {
    let Some(name) = name else {
        return Key::Other;
    };
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Key::Char(c),
        _ => Key::Other,
    }
}
