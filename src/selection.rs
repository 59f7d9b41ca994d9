//! Locating the user's selection and replacing it in place.
//!
//! There is no portable way to read another application's selection
//! directly, so capture goes through a synthetic copy keystroke. Capture
//! never mutates the surface: the selection stays highlighted and the text
//! stays in place, so a run that is rejected or fails downstream leaves the
//! user's editor exactly as it was. All mutation happens in `replace`. Two
//! kinds of surface get their own variant:
//!
//! * Edit controls (plain single-line/multi-line text widgets): the paste
//!   path is trusted, so replacement always pastes over the still-active
//!   selection, with typed insertion as the fallback.
//! * Editable regions (rich editors, word processors): replacement pastes
//!   over the selection, or types over it for applications whose input
//!   pipelines mangle synthetic paste (per the quirk table).

use log::{debug, warn};

use crate::settings::{AppQuirk, AppSettings};

/// Everything the locator and the variants need from the desktop. The
/// production implementation drives the real clipboard and keyboard;
/// tests substitute an in-memory buffer.
pub trait SurfaceHost {
    /// Identifier of the focused application (lowercased window class or
    /// process name), if the platform exposes one.
    fn focused_app(&mut self) -> Option<String>;
    /// Copy the current selection, leaving it highlighted and the surface
    /// untouched, and return its text.
    fn capture_copy(&mut self) -> Result<String, String>;
    /// Paste `text` at the caret (or over the active selection).
    fn insert_via_paste(&mut self, text: &str) -> Result<(), String>;
    /// Type `text` key by key, bypassing the clipboard.
    fn insert_via_typing(&mut self, text: &str) -> Result<(), String>;
    /// Show or hide the in-progress indicator.
    fn set_busy(&mut self, busy: bool);
}

/// How a replacement reaches an editable region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceStrategy {
    PasteOverSelection,
    TypedInsertion { collapse_newlines: bool },
}

/// Picks the replacement strategy for `app` from the configured quirk
/// table. Matching is case-insensitive substring, same as the blocked-app
/// check.
pub fn strategy_for(quirks: &[AppQuirk], app: Option<&str>) -> ReplaceStrategy {
    if let Some(app) = app {
        let app = app.to_lowercase();
        for quirk in quirks {
            if app.contains(&quirk.pattern.to_lowercase()) {
                return ReplaceStrategy::TypedInsertion {
                    collapse_newlines: quirk.collapse_newlines,
                };
            }
        }
    }
    ReplaceStrategy::PasteOverSelection
}

#[derive(Debug, Clone)]
pub struct EditControlSelection {
    text: String,
}

impl EditControlSelection {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The selection is still highlighted, so a paste lands the replacement
    /// over it. If pasting fails we fall back to typing rather than leave
    /// the run half-done.
    pub fn replace(&self, host: &mut dyn SurfaceHost, new_text: &str) -> Result<(), String> {
        if let Err(e) = host.insert_via_paste(new_text) {
            warn!("Paste into edit control failed ({}), typing instead", e);
            return host.insert_via_typing(new_text);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct EditableRegionSelection {
    text: String,
    app: Option<String>,
}

impl EditableRegionSelection {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    /// The selection is still highlighted, so whatever we insert replaces
    /// it. Quirky applications get typed insertion instead of a paste.
    pub fn replace(
        &self,
        host: &mut dyn SurfaceHost,
        quirks: &[AppQuirk],
        new_text: &str,
    ) -> Result<(), String> {
        match strategy_for(quirks, self.app.as_deref()) {
            ReplaceStrategy::PasteOverSelection => host.insert_via_paste(new_text),
            ReplaceStrategy::TypedInsertion { collapse_newlines } => {
                let text = if collapse_newlines {
                    collapse_to_single_lines(new_text)
                } else {
                    new_text.to_string()
                };
                host.insert_via_typing(&text)
            }
        }
    }
}

/// Chat-style inputs treat Enter as "send", so multi-line completions are
/// flattened before being typed into them.
fn collapse_to_single_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A located selection, ready to be replaced.
#[derive(Debug, Clone)]
pub enum ReplaceableSelection {
    EditControl(EditControlSelection),
    EditableRegion(EditableRegionSelection),
}

impl ReplaceableSelection {
    pub fn text(&self) -> &str {
        match self {
            ReplaceableSelection::EditControl(s) => s.text(),
            ReplaceableSelection::EditableRegion(s) => s.text(),
        }
    }

    pub fn app(&self) -> Option<&str> {
        match self {
            ReplaceableSelection::EditControl(_) => None,
            ReplaceableSelection::EditableRegion(s) => s.app(),
        }
    }

    pub fn replace(
        &self,
        host: &mut dyn SurfaceHost,
        settings: &AppSettings,
        new_text: &str,
    ) -> Result<(), String> {
        match self {
            ReplaceableSelection::EditControl(s) => s.replace(host, new_text),
            ReplaceableSelection::EditableRegion(s) => {
                s.replace(host, &settings.app_quirks, new_text)
            }
        }
    }
}

fn matches_any(patterns: &[String], app: &str) -> bool {
    let app = app.to_lowercase();
    patterns.iter().any(|p| app.contains(&p.to_lowercase()))
}

/// Finds the current selection in the focused application, or `None` when
/// there is nothing usable: the app is on the blocked list, nothing is
/// selected, or the capture backend failed. Capture is read-only; the
/// selection is intact and still active whatever the caller does next.
pub fn locate(host: &mut dyn SurfaceHost, settings: &AppSettings) -> Option<ReplaceableSelection> {
    let app = host.focused_app();

    if let Some(ref app) = app {
        if matches_any(&settings.blocked_apps, app) {
            debug!("Focused app '{}' is blocked, not capturing", app);
            return None;
        }
    }

    let is_edit_control = app
        .as_deref()
        .map(|a| matches_any(&settings.edit_control_apps, a))
        .unwrap_or(false);

    let text = match host.capture_copy() {
        Ok(text) => text,
        Err(e) => {
            warn!("Selection capture failed: {}", e);
            return None;
        }
    };

    if text.is_empty() {
        debug!("No text selected");
        return None;
    }

    debug!(
        "Captured {} chars from {} ({})",
        text.len(),
        app.as_deref().unwrap_or("unknown app"),
        if is_edit_control {
            "edit control"
        } else {
            "editable region"
        }
    );

    Some(if is_edit_control {
        ReplaceableSelection::EditControl(EditControlSelection { text })
    } else {
        ReplaceableSelection::EditableRegion(EditableRegionSelection { text, app })
    })
}


#[cfg(test)]
mod tests {
    use super::fake::FakeHost;
    use super::*;
    use crate::settings::{get_default_settings, AppSettings};

    fn settings() -> AppSettings {
        get_default_settings()
    }

    #[test]
    fn edit_control_capture_is_read_only_and_replace_pastes_over_selection() {
        let mut host = FakeHost::new("hello world", 6, 11).with_app("gedit");
        let sel = locate(&mut host, &settings()).unwrap();
        assert!(matches!(sel, ReplaceableSelection::EditControl(_)));
        assert_eq!(sel.text(), "world");
        // Capture leaves the control untouched and the selection active.
        assert_eq!(host.value, "hello world");

        sel.replace(&mut host, &settings(), "there").unwrap();
        assert_eq!(host.value, "hello there");
        assert_eq!(host.pastes, 1);
    }

    #[test]
    fn editable_region_capture_copies_and_replace_pastes_over_selection() {
        let mut host = FakeHost::new("hello world", 6, 11).with_app("firefox");
        let sel = locate(&mut host, &settings()).unwrap();
        assert!(matches!(sel, ReplaceableSelection::EditableRegion(_)));
        assert_eq!(sel.text(), "world");
        // Copy leaves the buffer untouched and the selection active.
        assert_eq!(host.value, "hello world");

        sel.replace(&mut host, &settings(), "there").unwrap();
        assert_eq!(host.value, "hello there");
    }

    #[test]
    fn unknown_app_is_treated_as_editable_region() {
        let mut host = FakeHost::new("abc", 0, 3);
        let sel = locate(&mut host, &settings()).unwrap();
        assert!(matches!(sel, ReplaceableSelection::EditableRegion(_)));
        assert!(sel.app().is_none());
    }

    #[test]
    fn blocked_app_yields_no_selection() {
        let mut host = FakeHost::new("ls -la", 0, 6).with_app("org.kde.konsole");
        assert!(locate(&mut host, &settings()).is_none());
        assert_eq!(host.value, "ls -la");
    }

    #[test]
    fn empty_selection_yields_none() {
        let mut host = FakeHost::new("hello", 2, 2).with_app("firefox");
        assert!(locate(&mut host, &settings()).is_none());
    }

    #[test]
    fn capture_failure_yields_none_not_panic() {
        let mut host = FakeHost::new("hello", 0, 5).with_app("firefox");
        host.fail_capture = true;
        assert!(locate(&mut host, &settings()).is_none());
    }

    #[test]
    fn quirky_app_gets_typed_insertion() {
        let settings = settings();
        let mut host = FakeHost::new("draft", 0, 5).with_app("soffice.bin");
        let sel = locate(&mut host, &settings).unwrap();
        sel.replace(&mut host, &settings, "final").unwrap();
        assert_eq!(host.value, "final");
        assert_eq!(host.typed, 1);
        assert_eq!(host.pastes, 0);
    }

    #[test]
    fn collapse_newlines_quirk_flattens_completion() {
        let settings = settings();
        let mut host = FakeHost::new("msg", 0, 3).with_app("slack");
        let sel = locate(&mut host, &settings).unwrap();
        sel.replace(&mut host, &settings, "line one\n\n  line two\n")
            .unwrap();
        assert_eq!(host.value, "line one line two");
        assert_eq!(host.typed, 1);
    }

    #[test]
    fn strategy_table_defaults_to_paste() {
        assert_eq!(
            strategy_for(&settings().app_quirks, Some("firefox")),
            ReplaceStrategy::PasteOverSelection
        );
        assert_eq!(
            strategy_for(&settings().app_quirks, None),
            ReplaceStrategy::PasteOverSelection
        );
    }
}
