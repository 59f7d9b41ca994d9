//! The real `SurfaceHost`: arboard for the clipboard, enigo for keystrokes.
//!
//! Captures and inserts go through the system clipboard, so the user's
//! clipboard contents are backed up before and restored after every
//! operation. Timings are deliberate: the focused application needs a beat
//! to service the synthetic keystroke before we read or restore.

use arboard::Clipboard;
use log::{debug, warn};
#[cfg(target_os = "linux")]
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::input;
use crate::selection::SurfaceHost;
use crate::settings::PasteCombo;

const KEYSTROKE_SETTLE_MS: u64 = 80;

pub struct DesktopHost {
    paste_combo: PasteCombo,
    notifications_enabled: bool,
    busy: bool,
}

impl DesktopHost {
    pub fn new(paste_combo: PasteCombo, notifications_enabled: bool) -> Self {
        Self {
            paste_combo,
            notifications_enabled,
            busy: false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    fn clipboard(&self) -> Result<Clipboard, String> {
        Clipboard::new().map_err(|e| format!("Failed to open clipboard: {}", e))
    }

    fn read_clipboard(&self) -> Option<String> {
        self.clipboard().ok().and_then(|mut cb| cb.get_text().ok())
    }

    fn write_clipboard(&self, text: &str) -> Result<(), String> {
        self.clipboard()?
            .set_text(text.to_string())
            .map_err(|e| format!("Failed to write clipboard: {}", e))
    }

    fn restore_clipboard(&self, backup: Option<String>) {
        if let Some(text) = backup {
            if let Err(e) = self.write_clipboard(&text) {
                warn!("Failed to restore clipboard: {}", e);
            }
        }
    }

    /// Runs `keystroke` with the clipboard cleared, then reads back whatever
    /// the focused application put there. The user's clipboard is restored
    /// afterwards.
    fn capture_with(
        &mut self,
        keystroke: fn() -> Result<(), String>,
    ) -> Result<String, String> {
        let backup = self.read_clipboard();

        // A stale clipboard entry would be indistinguishable from a capture,
        // so clear it first and treat "still empty" as "nothing selected".
        self.write_clipboard("")?;
        thread::sleep(Duration::from_millis(50));

        let result = keystroke().and_then(|_| {
            thread::sleep(Duration::from_millis(KEYSTROKE_SETTLE_MS));
            Ok(self.read_clipboard().unwrap_or_default())
        });

        self.restore_clipboard(backup);
        result
    }

    fn paste_text(&mut self, text: &str) -> Result<(), String> {
        let backup = self.read_clipboard();
        self.write_clipboard(text)?;
        thread::sleep(Duration::from_millis(50));

        let result = input::send_paste(self.paste_combo);
        thread::sleep(Duration::from_millis(KEYSTROKE_SETTLE_MS));

        self.restore_clipboard(backup);
        result
    }
}

impl SurfaceHost for DesktopHost {
    fn focused_app(&mut self) -> Option<String> {
        focused_app_name()
    }

    fn capture_copy(&mut self) -> Result<String, String> {
        self.capture_with(input::send_copy)
    }

    fn insert_via_paste(&mut self, text: &str) -> Result<(), String> {
        self.paste_text(text)
    }

    fn insert_via_typing(&mut self, text: &str) -> Result<(), String> {
        #[cfg(target_os = "linux")]
        {
            if type_text_native(text) {
                return Ok(());
            }
        }
        input::type_text(text)
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            debug!("busy indicator: {}", busy);
            if busy {
                crate::presentation::show_busy(self.notifications_enabled);
            }
        }
    }
}

/// Lowercased class of the focused window. Only X11 exposes this portably
/// from outside the compositor; elsewhere the capability degrades to `None`
/// and all surfaces are treated as editable regions.
fn focused_app_name() -> Option<String> {
    #[cfg(target_os = "linux")]
    {
        if std::env::var("WAYLAND_DISPLAY").is_err() {
            let output = Command::new("xdotool")
                .args(["getactivewindow", "getwindowclassname"])
                .output()
                .ok()?;
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout)
                    .trim()
                    .to_lowercase();
                if !name.is_empty() {
                    return Some(name);
                }
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SurfaceHost;

    #[test]
    fn busy_indicator_brackets_cleanly() {
        let mut host = DesktopHost::new(PasteCombo::CtrlV, false);
        assert!(!host.is_busy());
        host.set_busy(true);
        assert!(host.is_busy());
        host.set_busy(true);
        host.set_busy(false);
        assert!(!host.is_busy());
    }
}

/// Typing through the display server's own tool is more reliable than
/// enigo on Linux; fall through to enigo when neither tool is present.
#[cfg(target_os = "linux")]
fn type_text_native(text: &str) -> bool {
    let wayland = std::env::var("WAYLAND_DISPLAY").is_ok();
    let (tool, args): (&str, Vec<&str>) = if wayland {
        ("wtype", vec!["--", text])
    } else {
        ("xdotool", vec!["type", "--clearmodifiers", "--", text])
    };
    match Command::new(tool).args(&args).status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!("{} exited with {}", tool, status);
            false
        }
        Err(e) => {
            debug!("{} not available ({}), using enigo", tool, e);
            false
        }
    }
}
