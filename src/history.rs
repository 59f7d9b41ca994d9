//! Bounded log of past transform runs, kept in the local store.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::completion::CompletionParams;
use crate::store::Store;

pub const HISTORY_KEY: &str = "history";

/// One transform run, successful or not. Text and completion contents are
/// recorded only as character counts; the actual strings never leave the
/// surface they were typed into.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransformSummary {
    pub app: Option<String>,
    pub transform: String,
    pub success: bool,
    /// HTTP status of the response, or 0 when the request never reached
    /// the service.
    pub status: u16,
    pub time_utc: i64,
    pub response_ms: u64,
    pub params: CompletionParams,
    pub num_chars_text: usize,
    pub num_chars_prompt: usize,
    pub num_chars_completion: usize,
}

pub fn get_history(store: &Store) -> Vec<TransformSummary> {
    store.get(HISTORY_KEY).unwrap_or_default()
}

/// Appends a summary, evicting the oldest entries past `limit`.
pub fn append_summary(store: &Store, summary: TransformSummary, limit: usize) {
    info!(
        "Transform '{}' on {}: success={} status={} ({} ms, {} -> {} chars)",
        summary.transform,
        summary.app.as_deref().unwrap_or("unknown app"),
        summary.success,
        summary.status,
        summary.response_ms,
        summary.num_chars_text,
        summary.num_chars_completion,
    );

    let mut history = get_history(store);
    history.push(summary);
    while history.len() > limit {
        history.remove(0);
    }
    if let Err(e) = store.set(HISTORY_KEY, &history) {
        warn!("Failed to persist history: {}", e);
    }
}
