//! User-facing reporting: the popup state shown after a run, rendered as a
//! desktop notification, plus error categorization for readable messages.

use log::{info, warn};
use notify_rust::Notification;
use serde::{Deserialize, Serialize};

use crate::transforms::Transform;

/// What the user is told after a dispatch. `None` means nothing is shown;
/// any other variant stays up until the next action dismisses it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum PopupState {
    #[default]
    None,
    NoApiKey,
    NoTransform,
    NoSelection,
    SelectionTooLong,
    Error(String),
}

impl PopupState {
    pub fn message(&self) -> Option<String> {
        match self {
            PopupState::None => None,
            PopupState::NoApiKey => {
                Some("No API key set. Run 'retext set-api-key' first.".to_string())
            }
            PopupState::NoTransform => Some("No transform selected.".to_string()),
            PopupState::NoSelection => Some("No text is selected.".to_string()),
            PopupState::SelectionTooLong => {
                Some("Selection is too long to transform.".to_string())
            }
            PopupState::Error(message) => Some(message.clone()),
        }
    }
}

/// Error categories for popup display
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorCategory {
    Auth,
    RateLimit,
    Timeout,
    NetworkError,
    ServerError,
    ParseError,
    Unknown,
}

impl ErrorCategory {
    pub fn display_text(&self) -> &'static str {
        match self {
            ErrorCategory::Auth => "API key was rejected",
            ErrorCategory::RateLimit => "Rate limit reached",
            ErrorCategory::Timeout => "Request timed out",
            ErrorCategory::NetworkError => "Couldn't reach the completion service",
            ErrorCategory::ServerError => "Completion service error",
            ErrorCategory::ParseError => "Invalid response from the service",
            ErrorCategory::Unknown => "Transform failed",
        }
    }
}

/// Categorize an error string into an ErrorCategory
pub fn categorize_error(err_string: &str) -> ErrorCategory {
    let err_lower = err_string.to_lowercase();

    if err_lower.contains("api key")
        || err_lower.contains("unauthorized")
        || err_lower.contains("401")
        || err_lower.contains("authentication")
    {
        ErrorCategory::Auth
    } else if err_lower.contains("rate limit") || err_lower.contains("429") {
        ErrorCategory::RateLimit
    } else if err_lower.contains("timeout") || err_lower.contains("timed out") {
        ErrorCategory::Timeout
    } else if err_lower.contains("connect")
        || err_lower.contains("network")
        || err_lower.contains("dns")
        || err_lower.contains("resolve")
        || err_lower.contains("unreachable")
    {
        ErrorCategory::NetworkError
    } else if err_lower.contains("server")
        || err_lower.contains("500")
        || err_lower.contains("502")
        || err_lower.contains("503")
        || err_lower.contains("504")
    {
        ErrorCategory::ServerError
    } else if err_lower.contains("parse")
        || err_lower.contains("json")
        || err_lower.contains("deserialize")
    {
        ErrorCategory::ParseError
    } else {
        ErrorCategory::Unknown
    }
}

fn notify(summary: &str, body: &str) {
    let result = Notification::new()
        .appname("retext")
        .summary(summary)
        .body(body)
        .timeout(4000)
        .show();
    if let Err(e) = result {
        warn!("Failed to show notification: {}", e);
    }
}

/// Transient "working" indicator shown while a completion request is in
/// flight. The notification times itself out; a fast response simply
/// outruns it.
pub fn show_busy(notifications_enabled: bool) {
    info!("transforming selection...");
    if notifications_enabled {
        notify("retext", "Transforming selection...");
    }
}

/// Shows the popup state to the user. Logging always happens; the desktop
/// notification is skipped when disabled in settings.
pub fn render(popup: &PopupState, notifications_enabled: bool) {
    let Some(message) = popup.message() else {
        return;
    };
    info!("popup: {}", message);
    if notifications_enabled {
        let summary = match popup {
            PopupState::Error(raw) => categorize_error(raw).display_text(),
            _ => "retext",
        };
        notify(summary, &message);
    }
}

/// Announces the newly selected transform after a cycle.
pub fn announce_transform(transform: &Transform, notifications_enabled: bool) {
    info!("current transform: {}", transform.display_name());
    if notifications_enabled {
        notify("Transform selected", &transform.display_name());
    }
}
