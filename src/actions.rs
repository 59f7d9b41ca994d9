//! The action dispatcher: one user gesture in, one fully resolved run out.
//!
//! `try_transform` runs the whole pipeline: credentials, current transform,
//! selection capture, size check, in-flight guard, completion request,
//! in-place replacement, history record. Every exit path leaves the popup
//! state telling the user what happened (or `None` on success).

use chrono::Utc;
use log::{debug, info, warn};

use crate::completion::{CompletionApi, CompletionResult};
use crate::history::{self, TransformSummary};
use crate::presentation::PopupState;
use crate::secure_keys;
use crate::selection::{self, ReplaceableSelection, SurfaceHost};
use crate::settings::{self, AppSettings, MAX_SELECTION_CHARS};
use crate::store::Stores;
use crate::transforms::{self, Transform};

/// Store key holding the start time (ms since epoch) of an in-flight run.
/// A fresh marker makes subsequent gestures no-ops, so a slow request
/// cannot be stacked by an impatient user.
pub const REQUEST_MS_KEY: &str = "request_ms";
const REQUEST_DEBOUNCE_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TryTransform,
    SelectTransform,
    ClosePopup,
}

impl Action {
    /// Maps a shortcut id from the bindings table to its action.
    pub fn from_binding_id(id: &str) -> Option<Action> {
        match id {
            "try_transform" => Some(Action::TryTransform),
            "select_transform" => Some(Action::SelectTransform),
            _ => None,
        }
    }
}

pub struct Orchestrator<C: CompletionApi, H: SurfaceHost> {
    stores: Stores,
    client: C,
    host: H,
    popup: PopupState,
}

impl<C: CompletionApi, H: SurfaceHost> Orchestrator<C, H> {
    pub fn new(stores: Stores, client: C, host: H) -> Self {
        Self {
            stores,
            client,
            host,
            popup: PopupState::None,
        }
    }

    pub fn popup(&self) -> &PopupState {
        &self.popup
    }

    pub fn settings(&self) -> AppSettings {
        settings::get_settings(&self.stores.sync)
    }

    pub async fn dispatch(&mut self, action: Action) {
        debug!("dispatch: {:?}", action);
        match action {
            Action::ClosePopup => {
                self.popup = PopupState::None;
            }
            Action::TryTransform => {
                // A visible popup means the last run ended with something
                // the user has not acknowledged; the gesture dismisses it
                // instead of starting a new run.
                if self.popup != PopupState::None {
                    self.popup = PopupState::None;
                    return;
                }
                self.try_transform().await;
            }
            Action::SelectTransform => {
                self.popup = PopupState::None;
                match transforms::cycle_current_transform(&self.stores) {
                    Some(transform) => {
                        crate::presentation::announce_transform(
                            &transform,
                            self.settings().notifications_enabled,
                        );
                    }
                    None => {
                        self.popup = PopupState::NoTransform;
                    }
                }
            }
        }
    }

    async fn try_transform(&mut self) {
        let settings = self.settings();

        let api_key = match secure_keys::get_api_key(&self.stores.sync) {
            Ok(Some(key)) => key,
            Ok(None) => {
                self.popup = PopupState::NoApiKey;
                return;
            }
            Err(e) => {
                warn!("Failed to read API key: {}", e);
                self.popup = PopupState::NoApiKey;
                return;
            }
        };

        let Some(transform) = transforms::get_current_transform(&self.stores) else {
            self.popup = PopupState::NoTransform;
            return;
        };

        let Some(selection) = selection::locate(&mut self.host, &settings) else {
            self.popup = PopupState::NoSelection;
            return;
        };

        // Character count, not byte length, so multibyte text gets the
        // same bound as ASCII.
        if selection.text().chars().count() > MAX_SELECTION_CHARS {
            self.popup = PopupState::SelectionTooLong;
            return;
        }

        let now_ms = Utc::now().timestamp_millis();
        if let Some(started_ms) = self.stores.local.get::<i64>(REQUEST_MS_KEY) {
            if now_ms - started_ms < REQUEST_DEBOUNCE_MS {
                debug!("A request is already in flight, ignoring gesture");
                return;
            }
        }
        if let Err(e) = self.stores.local.set(REQUEST_MS_KEY, &now_ms) {
            warn!("Failed to persist in-flight marker: {}", e);
        }

        self.popup = self
            .transform_replace_selection(&api_key, &transform, &selection, &settings)
            .await;

        // The marker must never outlive the run, whatever happened in it.
        if let Err(e) = self.stores.local.remove(REQUEST_MS_KEY) {
            warn!("Failed to clear in-flight marker: {}", e);
        }
    }

    /// Sends the selected text through the completion service and splices
    /// the result back into the surface. Every outcome, including transport
    /// failure, is recorded in history.
    async fn transform_replace_selection(
        &mut self,
        api_key: &str,
        transform: &Transform,
        selection: &ReplaceableSelection,
        settings: &AppSettings,
    ) -> PopupState {
        let text = selection.text().to_string();
        let prompt = format!("{} \nQ: {}\n A:", transform.instructions, text);
        let num_chars_text = text.chars().count();
        let num_chars_prompt = prompt.chars().count();

        self.host.set_busy(true);
        let outcome = self.client.complete(api_key, &prompt).await;
        self.host.set_busy(false);

        let (popup, summary) = match outcome {
            Ok(response) => {
                let (popup, completion_chars) = match &response.result {
                    CompletionResult::Success { text: raw, .. } => {
                        let completion = raw.trim();
                        let num_chars_completion = completion.chars().count();
                        match selection.replace(&mut self.host, settings, completion) {
                            Ok(()) => {
                                info!(
                                    "Replaced {} chars with {} chars via '{}'",
                                    num_chars_text, num_chars_completion, transform.title
                                );
                                (PopupState::None, num_chars_completion)
                            }
                            Err(e) => {
                                warn!("Replacement failed: {}", e);
                                (
                                    PopupState::Error(format!(
                                        "Couldn't insert the result: {}",
                                        e
                                    )),
                                    num_chars_completion,
                                )
                            }
                        }
                    }
                    CompletionResult::Failure { message } => {
                        (PopupState::Error(message.clone()), 0)
                    }
                };
                let summary = TransformSummary {
                    app: selection.app().map(str::to_string),
                    transform: transform.title.clone(),
                    success: response.result.is_success() && popup == PopupState::None,
                    status: response.status,
                    time_utc: response.start_utc,
                    response_ms: response.response_ms,
                    params: response.params,
                    num_chars_text,
                    num_chars_prompt,
                    num_chars_completion: completion_chars,
                };
                (popup, summary)
            }
            Err(e) => {
                warn!("Completion request failed: {}", e);
                let summary = TransformSummary {
                    app: selection.app().map(str::to_string),
                    transform: transform.title.clone(),
                    success: false,
                    status: 0,
                    time_utc: Utc::now().timestamp(),
                    response_ms: 0,
                    params: self.client.params_for(&prompt),
                    num_chars_text,
                    num_chars_prompt,
                    num_chars_completion: 0,
                };
                (
                    PopupState::Error("Couldn't reach the completion service.".to_string()),
                    summary,
                )
            }
        };

        history::append_summary(&self.stores.local, summary, settings.history_limit);
        popup
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{max_tokens_for, CompletionParams, CompletionResponse};
    use crate::selection::fake::FakeHost;
    use crate::settings::load_or_create_settings;
    use crate::store::{Scope, Store, Stores};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Clone)]
    enum CannedOutcome {
        Success(&'static str),
        Failure { status: u16, message: &'static str },
        Transport(&'static str),
    }

    struct FakeClient {
        outcome: CannedOutcome,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn new(outcome: CannedOutcome) -> Self {
            Self {
                outcome,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionApi for FakeClient {
        fn params_for(&self, prompt: &str) -> CompletionParams {
            CompletionParams {
                model: "test-model".to_string(),
                temperature: 0.9,
                max_tokens: max_tokens_for(prompt),
                top_p: 1.0,
                frequency_penalty: 0.0,
                presence_penalty: 0.0,
                prompt: prompt.to_string(),
            }
        }

        async fn complete(
            &self,
            _api_key: &str,
            prompt: &str,
        ) -> Result<CompletionResponse, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcome.clone() {
                CannedOutcome::Success(text) => Ok(CompletionResponse {
                    status: 200,
                    start_utc: 0,
                    response_ms: 12,
                    params: self.params_for(prompt),
                    result: CompletionResult::Success {
                        text: text.to_string(),
                        usage: None,
                    },
                }),
                CannedOutcome::Failure { status, message } => Ok(CompletionResponse {
                    status,
                    start_utc: 0,
                    response_ms: 12,
                    params: self.params_for(prompt),
                    result: CompletionResult::Failure {
                        message: message.to_string(),
                    },
                }),
                CannedOutcome::Transport(message) => Err(message.to_string()),
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        orchestrator: Orchestrator<FakeClient, FakeHost>,
    }

    fn fixture(outcome: CannedOutcome, host: FakeHost) -> Fixture {
        let dir = tempdir().unwrap();
        let stores = Stores {
            sync: Store::open(dir.path(), Scope::Sync).unwrap(),
            local: Store::open(dir.path(), Scope::Local).unwrap(),
        };
        load_or_create_settings(&stores.sync);
        stores.sync.set("api_key", &"sk-test").unwrap();
        crate::transforms::get_transforms(&stores);
        crate::transforms::set_current_transform(&stores.local, "Simplify");
        Fixture {
            _dir: dir,
            orchestrator: Orchestrator::new(stores, FakeClient::new(outcome), host),
        }
    }

    #[tokio::test]
    async fn success_replaces_selection_with_trimmed_completion() {
        let host = FakeHost::new("some dense prose", 0, 16).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success(" Hola \n"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::None);
        assert_eq!(f.orchestrator.host.value, "Hola");
        assert!(!f.orchestrator.host.busy);

        let history = history::get_history(&f.orchestrator.stores.local);
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].status, 200);
        assert_eq!(history[0].transform, "Simplify");
        assert_eq!(history[0].num_chars_completion, 4);
    }

    #[tokio::test]
    async fn prompt_embeds_instructions_and_selection() {
        let host = FakeHost::new("agua", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("water"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        let history = history::get_history(&f.orchestrator.stores.local);
        let prompt = &history[0].params.prompt;
        assert!(prompt.ends_with(" \nQ: agua\n A:"));
        assert!(prompt.starts_with("Rewrite the following text"));
    }

    #[tokio::test]
    async fn api_failure_shows_server_message_and_records_failure() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(
            CannedOutcome::Failure {
                status: 401,
                message: "Incorrect API key provided",
            },
            host,
        );

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(
            *f.orchestrator.popup(),
            PopupState::Error("Incorrect API key provided".to_string())
        );
        // The surface is untouched.
        assert_eq!(f.orchestrator.host.value, "text");

        let history = history::get_history(&f.orchestrator.stores.local);
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].status, 401);
    }

    #[tokio::test]
    async fn transport_failure_still_lands_in_history_with_status_zero() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Transport("dns error"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(
            *f.orchestrator.popup(),
            PopupState::Error("Couldn't reach the completion service.".to_string())
        );
        let history = history::get_history(&f.orchestrator.stores.local);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, 0);
        assert!(!history[0].success);
        assert!(!f.orchestrator.host.busy);
    }

    #[tokio::test]
    async fn failed_request_leaves_an_edit_control_untouched() {
        let host = FakeHost::new("keep this draft", 5, 15).with_app("gedit");
        let mut f = fixture(
            CannedOutcome::Failure {
                status: 500,
                message: "internal error",
            },
            host,
        );

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(f.orchestrator.host.value, "keep this draft");
        assert!(matches!(*f.orchestrator.popup(), PopupState::Error(_)));
    }

    #[tokio::test]
    async fn transport_failure_leaves_an_edit_control_untouched() {
        let host = FakeHost::new("keep this draft", 5, 15).with_app("gedit");
        let mut f = fixture(CannedOutcome::Transport("dns error"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(f.orchestrator.host.value, "keep this draft");
    }

    #[tokio::test]
    async fn oversize_edit_control_selection_survives_the_rejection() {
        let big = "x".repeat(MAX_SELECTION_CHARS + 1);
        let host = FakeHost::new(&big, 0, big.len()).with_app("gedit");
        let mut f = fixture(CannedOutcome::Success("nope"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::SelectionTooLong);
        assert_eq!(f.orchestrator.host.value, big);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn selection_bound_counts_chars_not_bytes() {
        // 2500 two-byte chars: 5000 bytes, well under the 4000-char bound.
        let text = "é".repeat(2500);
        let host = FakeHost::new(&text, 0, text.len()).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("ok"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::None);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 1);
        let history = history::get_history(&f.orchestrator.stores.local);
        assert_eq!(history[0].num_chars_text, 2500);
    }

    #[tokio::test]
    async fn oversize_selection_never_reaches_the_client() {
        let big = "x".repeat(MAX_SELECTION_CHARS + 1);
        let host = FakeHost::new(&big, 0, big.len()).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("nope"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::SelectionTooLong);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
        assert!(history::get_history(&f.orchestrator.stores.local).is_empty());
    }

    #[tokio::test]
    async fn no_selection_shows_popup_without_calling_the_client() {
        let host = FakeHost::new("text", 2, 2).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("nope"), host);

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::NoSelection);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_before_anything_else() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("nope"), host);
        f.orchestrator.stores.sync.remove("api_key").unwrap();

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::NoApiKey);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_current_transform_is_reported() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("nope"), host);
        f.orchestrator
            .stores
            .local
            .remove(crate::transforms::CURRENT_TRANSFORM_KEY)
            .unwrap();

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::NoTransform);
    }

    #[tokio::test]
    async fn fresh_in_flight_marker_makes_the_gesture_a_silent_noop() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("nope"), host);
        f.orchestrator
            .stores
            .local
            .set(REQUEST_MS_KEY, &Utc::now().timestamp_millis())
            .unwrap();

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::None);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
        assert!(history::get_history(&f.orchestrator.stores.local).is_empty());
    }

    #[tokio::test]
    async fn stale_in_flight_marker_is_ignored_and_cleared() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("ok"), host);
        let stale = Utc::now().timestamp_millis() - REQUEST_DEBOUNCE_MS - 1;
        f.orchestrator
            .stores
            .local
            .set(REQUEST_MS_KEY, &stale)
            .unwrap();

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 1);
        assert!(!f.orchestrator.stores.local.contains(REQUEST_MS_KEY));
    }

    #[tokio::test]
    async fn gesture_dismisses_a_visible_popup_instead_of_running() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("ok"), host);
        f.orchestrator.popup = PopupState::Error("old news".to_string());

        f.orchestrator.dispatch(Action::TryTransform).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::None);
        assert_eq!(f.orchestrator.client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_popup_clears_state() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("ok"), host);
        f.orchestrator.popup = PopupState::NoSelection;

        f.orchestrator.dispatch(Action::ClosePopup).await;

        assert_eq!(*f.orchestrator.popup(), PopupState::None);
    }

    #[tokio::test]
    async fn select_transform_advances_the_current_transform() {
        let host = FakeHost::new("text", 0, 4).with_app("firefox");
        let mut f = fixture(CannedOutcome::Success("ok"), host);

        f.orchestrator.dispatch(Action::SelectTransform).await;

        let current =
            crate::transforms::get_current_transform(&f.orchestrator.stores).unwrap();
        assert_ne!(current.title, "Simplify");
    }
}
