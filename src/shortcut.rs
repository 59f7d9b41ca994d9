//! Global keyboard shortcuts via an rdev listener thread.
//!
//! The listener runs on its own OS thread (rdev's `listen` blocks forever)
//! and pushes `ShortcutEvent`s into a tokio channel the main loop consumes.
//! The event callback must stay non-blocking, so every lock in it is a
//! `try_lock` that drops the event rather than stall the input stack.

use log::{debug, error, info};
use rdev::{Event, EventType, Key};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Tracks which modifiers are currently held.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl ModifierState {
    pub fn update(&mut self, key: Key, pressed: bool) {
        match key {
            Key::ControlLeft | Key::ControlRight => self.ctrl = pressed,
            Key::ShiftLeft | Key::ShiftRight => self.shift = pressed,
            Key::Alt | Key::AltGr => self.alt = pressed,
            Key::MetaLeft | Key::MetaRight => self.meta = pressed,
            _ => {}
        }
    }

    pub fn matches(&self, required: &ModifierState) -> bool {
        self == required
    }
}

#[derive(Debug, Clone)]
pub struct RegisteredShortcut {
    pub key: Key,
    pub modifiers: ModifierState,
    pub binding: String,
}

/// Emitted once per physical press; key repeat is suppressed.
#[derive(Debug, Clone)]
pub struct ShortcutEvent {
    pub id: String,
}

#[derive(Default)]
struct ListenerState {
    modifiers: Mutex<ModifierState>,
    shortcuts: Mutex<HashMap<String, RegisteredShortcut>>,
    active: Mutex<HashMap<String, bool>>,
}

pub struct ShortcutListener {
    state: Arc<ListenerState>,
}

impl ShortcutListener {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ListenerState::default()),
        }
    }

    /// Registers a shortcut from a binding string like "ctrl+shift+space".
    pub fn register(&self, id: &str, binding: &str) -> Result<(), String> {
        let (key, modifiers) = parse_shortcut_string(binding)?;
        let shortcut = RegisteredShortcut {
            key,
            modifiers,
            binding: binding.to_string(),
        };
        let mut shortcuts = self.state.shortcuts.lock().map_err(|e| e.to_string())?;
        shortcuts.insert(id.to_string(), shortcut);
        info!("Registered shortcut '{}': {}", id, binding);
        Ok(())
    }

    /// Spawns the blocking rdev listener thread. Events land on `tx`.
    pub fn start(&self, tx: mpsc::Sender<ShortcutEvent>) {
        let state = self.state.clone();
        std::thread::spawn(move || {
            info!("Key listener started");
            if let Err(e) = rdev::listen(move |event| handle_event(event, &state, &tx)) {
                error!("Key listener failed: {:?}", e);
            }
        });
    }
}

fn handle_event(event: Event, state: &ListenerState, tx: &mpsc::Sender<ShortcutEvent>) {
    match event.event_type {
        EventType::KeyPress(key) => {
            let current_mods = {
                let Ok(mut mods) = state.modifiers.try_lock() else {
                    return;
                };
                mods.update(key, true);
                mods.clone()
            };

            let Ok(shortcuts) = state.shortcuts.try_lock() else {
                return;
            };
            let Ok(mut active) = state.active.try_lock() else {
                return;
            };

            for (id, shortcut) in shortcuts.iter() {
                if shortcut.key == key && current_mods.matches(&shortcut.modifiers) {
                    // Fire once per physical press, not on key repeat.
                    if !active.get(id).copied().unwrap_or(false) {
                        active.insert(id.clone(), true);
                        debug!("Shortcut pressed: {} ({})", id, shortcut.binding);
                        // The channel is bounded; if the main loop is mid-run
                        // the extra press is dropped, which also serves as a
                        // natural rate limit.
                        let _ = tx.try_send(ShortcutEvent { id: id.clone() });
                    }
                }
            }
        }
        EventType::KeyRelease(key) => {
            let current_mods = {
                let Ok(mut mods) = state.modifiers.try_lock() else {
                    return;
                };
                mods.update(key, false);
                mods.clone()
            };

            let Ok(shortcuts) = state.shortcuts.try_lock() else {
                return;
            };
            let Ok(mut active) = state.active.try_lock() else {
                return;
            };

            for (id, shortcut) in shortcuts.iter() {
                let released =
                    shortcut.key == key || !current_mods.matches(&shortcut.modifiers);
                if released {
                    active.insert(id.clone(), false);
                }
            }
        }
        _ => {}
    }
}

/// Parses "ctrl+shift+space" style bindings into a main key plus required
/// modifiers. Exactly one non-modifier key is required.
pub fn parse_shortcut_string(binding: &str) -> Result<(Key, ModifierState), String> {
    let binding = binding.trim().to_lowercase();
    let mut modifiers = ModifierState::default();
    let mut main_key: Option<Key> = None;

    for part in binding.split('+').map(str::trim) {
        match part {
            "ctrl" | "control" => modifiers.ctrl = true,
            "shift" => modifiers.shift = true,
            "alt" | "option" => modifiers.alt = true,
            "win" | "super" | "meta" | "cmd" | "command" => modifiers.meta = true,
            key_str => {
                if main_key.is_some() {
                    return Err(format!(
                        "Multiple main keys in shortcut '{}': found '{}'",
                        binding, key_str
                    ));
                }
                main_key = Some(string_to_rdev_key(key_str)?);
            }
        }
    }

    match main_key {
        Some(key) => Ok((key, modifiers)),
        None => Err(format!("Shortcut '{}' has no main key", binding)),
    }
}

fn string_to_rdev_key(s: &str) -> Result<Key, String> {
    match s {
        "space" | "spacebar" => Ok(Key::Space),
        "enter" | "return" => Ok(Key::Return),
        "tab" => Ok(Key::Tab),
        "escape" | "esc" => Ok(Key::Escape),
        "backspace" => Ok(Key::Backspace),
        "delete" | "del" => Ok(Key::Delete),
        "insert" | "ins" => Ok(Key::Insert),
        "home" => Ok(Key::Home),
        "end" => Ok(Key::End),
        "caps lock" | "capslock" | "caps" => Ok(Key::CapsLock),

        "f1" => Ok(Key::F1),
        "f2" => Ok(Key::F2),
        "f3" => Ok(Key::F3),
        "f4" => Ok(Key::F4),
        "f5" => Ok(Key::F5),
        "f6" => Ok(Key::F6),
        "f7" => Ok(Key::F7),
        "f8" => Ok(Key::F8),
        "f9" => Ok(Key::F9),
        "f10" => Ok(Key::F10),
        "f11" => Ok(Key::F11),
        "f12" => Ok(Key::F12),

        "a" => Ok(Key::KeyA),
        "b" => Ok(Key::KeyB),
        "c" => Ok(Key::KeyC),
        "d" => Ok(Key::KeyD),
        "e" => Ok(Key::KeyE),
        "f" => Ok(Key::KeyF),
        "g" => Ok(Key::KeyG),
        "h" => Ok(Key::KeyH),
        "i" => Ok(Key::KeyI),
        "j" => Ok(Key::KeyJ),
        "k" => Ok(Key::KeyK),
        "l" => Ok(Key::KeyL),
        "m" => Ok(Key::KeyM),
        "n" => Ok(Key::KeyN),
        "o" => Ok(Key::KeyO),
        "p" => Ok(Key::KeyP),
        "q" => Ok(Key::KeyQ),
        "r" => Ok(Key::KeyR),
        "s" => Ok(Key::KeyS),
        "t" => Ok(Key::KeyT),
        "u" => Ok(Key::KeyU),
        "v" => Ok(Key::KeyV),
        "w" => Ok(Key::KeyW),
        "x" => Ok(Key::KeyX),
        "y" => Ok(Key::KeyY),
        "z" => Ok(Key::KeyZ),

        "0" => Ok(Key::Num0),
        "1" => Ok(Key::Num1),
        "2" => Ok(Key::Num2),
        "3" => Ok(Key::Num3),
        "4" => Ok(Key::Num4),
        "5" => Ok(Key::Num5),
        "6" => Ok(Key::Num6),
        "7" => Ok(Key::Num7),
        "8" => Ok(Key::Num8),
        "9" => Ok(Key::Num9),

        other => Err(format!("Unknown key in shortcut: '{}'", other)),
    }
}
