//! Key bindings and the deferred event queue.
//!
//! A key press never runs user code on the notification thread. It only
//! appends the key's bound callbacks to the live queue; the frame loop swaps
//! the queue for an empty one and invokes the drained batch on its own
//! thread. Anything enqueued while that batch runs lands in the fresh queue
//! and fires on the next frame, never the current one.

use std::mem;
use std::sync::{Arc, Mutex};

/// An opaque invocable bound to a key. The engine only needs "call with no
/// arguments, observe success or failure"; the host supplies the rest.
pub trait EventCallback: Send + Sync {
    fn invoke(&self) -> Result<(), String>;
}

const TABLE_SIZE: usize = 256;

/// A slot in the binding table. Printable ASCII keys use their lowercased
/// byte value; named keys occupy codes past the ASCII range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode(u8);

impl KeyCode {
    pub const ENTER: KeyCode = KeyCode(128);
    pub const ESCAPE: KeyCode = KeyCode(129);
    pub const LEFT: KeyCode = KeyCode(130);
    pub const RIGHT: KeyCode = KeyCode(131);
    pub const UP: KeyCode = KeyCode(132);
    pub const DOWN: KeyCode = KeyCode(133);
    pub const SHIFT: KeyCode = KeyCode(134);
    pub const CONTROL: KeyCode = KeyCode(135);

    pub fn from_char(c: char) -> Option<KeyCode> {
        if c.is_ascii() {
            Some(KeyCode(c.to_ascii_lowercase() as u8))
        } else {
            None
        }
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Resolve a binding name to its key code. Named keys match
/// case-insensitively; any other single ASCII character binds that
/// character's key.
pub fn resolve_key(name: &str) -> Result<KeyCode, String> {
    let lower = name.to_ascii_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" => KeyCode::ENTER,
        "esc" | "escape" => KeyCode::ESCAPE,
        "left" => KeyCode::LEFT,
        "right" => KeyCode::RIGHT,
        "up" => KeyCode::UP,
        "down" => KeyCode::DOWN,
        "shift" => KeyCode::SHIFT,
        "ctrl" | "control" => KeyCode::CONTROL,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::from_char(c)
                    .ok_or_else(|| format!("key '{name}' is not an ASCII character"))?,
                _ => return Err(format!("unknown key name '{name}'")),
            }
        }
    };
    Ok(code)
}

/// Fixed table from key code to the callbacks bound there, in registration
/// order. Every callback bound to a key fires on each press of that key.
pub struct KeyBindings {
    table: Vec<Vec<Arc<dyn EventCallback>>>,
}

impl KeyBindings {
    pub fn new() -> Self {
        Self {
            table: (0..TABLE_SIZE).map(|_| Vec::new()).collect(),
        }
    }

    pub fn bind(&mut self, code: KeyCode, callback: Arc<dyn EventCallback>) {
        self.table[code.index()].push(callback);
    }

    pub fn bound(&self, code: KeyCode) -> &[Arc<dyn EventCallback>] {
        &self.table[code.index()]
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self::new()
    }
}

/// The live queue of pending callback invocations. The mutex around the
/// vec is the single mutual-exclusion point between the notification
/// thread's appends and the frame loop's swap-and-drain.
pub struct EventQueue {
    pending: Mutex<Vec<Arc<dyn EventCallback>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn extend(&self, callbacks: &[Arc<dyn EventCallback>]) {
        let mut pending = self.pending.lock().unwrap();
        pending.extend(callbacks.iter().cloned());
    }

    /// Take everything queued so far, leaving an empty queue behind. The
    /// caller invokes the batch outside the lock.
    pub fn drain(&self) -> Vec<Arc<dyn EventCallback>> {
        mem::take(&mut *self.pending.lock().unwrap())
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
