//! Synthetic keystroke helpers built on enigo.
//!
//! Each helper creates its own `Enigo` instance; construction is cheap and
//! holding one across calls keeps an X11 connection open longer than needed.

use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use log::debug;
use std::thread;
use std::time::Duration;

use crate::settings::PasteCombo;

#[cfg(target_os = "macos")]
const MODIFIER: Key = Key::Meta;
#[cfg(not(target_os = "macos"))]
const MODIFIER: Key = Key::Control;

fn new_enigo() -> Result<Enigo, String> {
    Enigo::new(&Settings::default()).map_err(|e| format!("Failed to initialize enigo: {:?}", e))
}

fn combo(modifiers: &[Key], key: Key) -> Result<(), String> {
    let mut enigo = new_enigo()?;
    for m in modifiers {
        enigo
            .key(*m, Direction::Press)
            .map_err(|e| format!("Failed to press modifier: {:?}", e))?;
    }
    let result = enigo
        .key(key, Direction::Click)
        .map_err(|e| format!("Failed to send key: {:?}", e));
    // Always release modifiers, even when the click failed, so the user's
    // keyboard is not left with a stuck Ctrl.
    for m in modifiers.iter().rev() {
        let _ = enigo.key(*m, Direction::Release);
    }
    thread::sleep(Duration::from_millis(50));
    result
}

/// Ctrl+C (Cmd+C on macOS).
pub fn send_copy() -> Result<(), String> {
    debug!("Sending copy keystroke");
    combo(&[MODIFIER], Key::Unicode('c'))
}

/// Paste keystroke per the configured combo. Terminals and some editors
/// expect Ctrl+Shift+V or Shift+Insert instead of plain Ctrl+V.
pub fn send_paste(paste_combo: PasteCombo) -> Result<(), String> {
    debug!("Sending paste keystroke ({:?})", paste_combo);
    match paste_combo {
        PasteCombo::CtrlV => combo(&[MODIFIER], Key::Unicode('v')),
        PasteCombo::CtrlShiftV => combo(&[MODIFIER, Key::Shift], Key::Unicode('v')),
        PasteCombo::ShiftInsert => {
            #[cfg(target_os = "macos")]
            {
                combo(&[MODIFIER], Key::Unicode('v'))
            }
            #[cfg(not(target_os = "macos"))]
            {
                combo(&[Key::Shift], Key::Insert)
            }
        }
    }
}

/// Types `text` directly, bypassing the clipboard. Slower than pasting but
/// works in surfaces that reinterpret pasted content.
pub fn type_text(text: &str) -> Result<(), String> {
    debug!("Typing {} chars", text.len());
    let mut enigo = new_enigo()?;
    enigo
        .text(text)
        .map_err(|e| format!("Failed to type text: {:?}", e))
}
