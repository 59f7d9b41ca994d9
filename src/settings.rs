use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::Store;

pub const SETTINGS_KEY: &str = "settings";

/// Selections are bounded before the prompt is built: 1000 tokens at the
/// conventional 4 chars/token.
pub const MAX_SELECTION_TOKENS: usize = 1000;
pub const MAX_SELECTION_CHARS: usize =
    MAX_SELECTION_TOKENS * crate::completion::APPROX_CHARS_PER_TOKEN;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShortcutBinding {
    pub id: String,
    pub name: String,
    pub description: String,
    pub default_binding: String,
    pub current_binding: String,
}

/// Key combination used when the replace path goes through the clipboard.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PasteCombo {
    CtrlV,
    CtrlShiftV,
    ShiftInsert,
}

impl Default for PasteCombo {
    fn default() -> Self {
        PasteCombo::CtrlV
    }
}

/// One entry of the replace-path strategy table for editable-region surfaces.
/// Applications matching `pattern` (case-insensitive substring of the focused
/// window class) reject synthetic paste over a highlighted selection, so the
/// replacement is typed instead. `collapse_newlines` marks apps whose editors
/// mangle embedded newlines in typed input.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppQuirk {
    pub pattern: String,
    #[serde(default)]
    pub collapse_newlines: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppSettings {
    pub bindings: HashMap<String, ShortcutBinding>,
    /// OpenAI-compatible completions endpoint root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub paste_combo: PasteCombo,
    /// Applications where no selection capture is attempted at all. These
    /// intercept the copy/paste keystrokes themselves (terminals foremost), so
    /// no capability on them is supported.
    #[serde(default = "default_blocked_apps")]
    pub blocked_apps: Vec<String>,
    /// Applications classified as plain edit controls: the paste path is
    /// trusted to land over the selection, so replacement never needs the
    /// quirk table.
    #[serde(default = "default_edit_control_apps")]
    pub edit_control_apps: Vec<String>,
    #[serde(default = "default_app_quirks")]
    pub app_quirks: Vec<AppQuirk>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo-instruct".to_string()
}

fn default_temperature() -> f32 {
    0.9
}

fn default_top_p() -> f32 {
    1.0
}

fn default_history_limit() -> usize {
    100
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_true() -> bool {
    true
}

fn default_blocked_apps() -> Vec<String> {
    [
        "gnome-terminal",
        "konsole",
        "alacritty",
        "kitty",
        "xterm",
        "terminator",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_edit_control_apps() -> Vec<String> {
    ["gedit", "kate", "mousepad", "notepad"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_app_quirks() -> Vec<AppQuirk> {
    vec![
        AppQuirk {
            pattern: "soffice".to_string(),
            collapse_newlines: false,
        },
        AppQuirk {
            pattern: "slack".to_string(),
            collapse_newlines: true,
        },
    ]
}

pub fn get_default_settings() -> AppSettings {
    #[cfg(target_os = "macos")]
    let default_transform_shortcut = "option+shift+space";
    #[cfg(not(target_os = "macos"))]
    let default_transform_shortcut = "ctrl+shift+space";

    #[cfg(target_os = "macos")]
    let default_select_shortcut = "option+shift+t";
    #[cfg(not(target_os = "macos"))]
    let default_select_shortcut = "ctrl+shift+t";

    let mut bindings = HashMap::new();
    bindings.insert(
        "try_transform".to_string(),
        ShortcutBinding {
            id: "try_transform".to_string(),
            name: "Apply Transform".to_string(),
            description: "Replace the selected text with the current transform's output."
                .to_string(),
            default_binding: default_transform_shortcut.to_string(),
            current_binding: default_transform_shortcut.to_string(),
        },
    );
    bindings.insert(
        "select_transform".to_string(),
        ShortcutBinding {
            id: "select_transform".to_string(),
            name: "Next Transform".to_string(),
            description: "Cycle to the next transform in the list.".to_string(),
            default_binding: default_select_shortcut.to_string(),
            current_binding: default_select_shortcut.to_string(),
        },
    );

    AppSettings {
        bindings,
        base_url: default_base_url(),
        model: default_model(),
        temperature: default_temperature(),
        top_p: default_top_p(),
        frequency_penalty: 0.0,
        presence_penalty: 0.0,
        history_limit: default_history_limit(),
        log_level: default_log_level(),
        notifications_enabled: true,
        paste_combo: PasteCombo::default(),
        blocked_apps: default_blocked_apps(),
        edit_control_apps: default_edit_control_apps(),
        app_quirks: default_app_quirks(),
    }
}

/// Reads settings from the sync store, merging in any bindings added since
/// the file was written. Falls back to defaults on a missing or unreadable
/// entry, writing them back so the file stays editable by hand.
pub fn load_or_create_settings(store: &Store) -> AppSettings {
    let mut settings = match store.get::<AppSettings>(SETTINGS_KEY) {
        Some(settings) => settings,
        None => {
            debug!("No stored settings, writing defaults");
            let defaults = get_default_settings();
            if let Err(e) = store.set(SETTINGS_KEY, &defaults) {
                warn!("Failed to persist default settings: {}", e);
            }
            return defaults;
        }
    };

    let mut updated = false;
    for (key, value) in get_default_settings().bindings {
        if !settings.bindings.contains_key(&key) {
            debug!("Adding missing binding: {}", key);
            settings.bindings.insert(key, value);
            updated = true;
        }
    }
    if updated {
        if let Err(e) = store.set(SETTINGS_KEY, &settings) {
            warn!("Failed to persist merged settings: {}", e);
        }
    }

    settings
}

pub fn get_settings(store: &Store) -> AppSettings {
    store
        .get::<AppSettings>(SETTINGS_KEY)
        .unwrap_or_else(get_default_settings)
}

pub fn write_settings(store: &Store, settings: &AppSettings) {
    if let Err(e) = store.set(SETTINGS_KEY, settings) {
        warn!("Failed to write settings: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Scope;

    #[test]
    fn defaults_are_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Scope::Sync).unwrap();
        let settings = load_or_create_settings(&store);
        assert!(settings.bindings.contains_key("try_transform"));
        assert!(store.contains(SETTINGS_KEY));
    }

    #[test]
    fn missing_bindings_are_merged_in() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), Scope::Sync).unwrap();
        let mut settings = get_default_settings();
        settings.bindings.remove("select_transform");
        store.set(SETTINGS_KEY, &settings).unwrap();

        let reloaded = load_or_create_settings(&store);
        assert!(reloaded.bindings.contains_key("select_transform"));
    }

    #[test]
    fn selection_bound_is_four_thousand_chars() {
        assert_eq!(MAX_SELECTION_CHARS, 4000);
    }

    #[test]
    fn log_level_maps_onto_the_facade_filter() {
        let pairs = [
            (LogLevel::Trace, log::LevelFilter::Trace),
            (LogLevel::Debug, log::LevelFilter::Debug),
            (LogLevel::Info, log::LevelFilter::Info),
            (LogLevel::Warn, log::LevelFilter::Warn),
            (LogLevel::Error, log::LevelFilter::Error),
        ];
        for (level, filter) in pairs {
            assert_eq!(log::LevelFilter::from(level), filter);
        }
    }
}
