//! Client for the OpenAI-compatible text completion endpoint.
//!
//! One request, one response, no internal retry. HTTP-level failures come
//! back as `CompletionResult::Failure` carrying the server's message;
//! transport failures (offline, DNS, TLS) propagate as `Err` so the caller
//! can distinguish "the service said no" from "the service never answered".

use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::settings::AppSettings;

pub const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Request body for `POST {base_url}/completions`. Everything but
/// `max_tokens` and `prompt` is fixed per configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub prompt: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Deserialize, Debug)]
struct CompletionBody {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    text: String,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    message: String,
}

#[derive(Debug, Clone)]
pub enum CompletionResult {
    Success { text: String, usage: Option<Usage> },
    Failure { message: String },
}

impl CompletionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CompletionResult::Success { .. })
    }
}

/// One completed request/response exchange, with the timing and parameters
/// the history record needs.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub status: u16,
    pub start_utc: i64,
    pub response_ms: u64,
    pub params: CompletionParams,
    pub result: CompletionResult,
}

/// Short prompts still get a generous completion budget; long prompts scale
/// theirs so the output is not truncated relative to the input. Counted in
/// characters, matching the selection bound.
pub fn max_tokens_for(prompt: &str) -> u32 {
    (prompt.chars().count() * 2 / APPROX_CHARS_PER_TOKEN).max(400) as u32
}

/// The seam the orchestrator calls through; a test double stands in for the
/// network in unit tests.
#[async_trait]
pub trait CompletionApi {
    async fn complete(&self, api_key: &str, prompt: &str) -> Result<CompletionResponse, String>;
    fn params_for(&self, prompt: &str) -> CompletionParams;
}

pub struct CompletionClient {
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(settings: &AppSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_p: settings.top_p,
            frequency_penalty: settings.frequency_penalty,
            presence_penalty: settings.presence_penalty,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionApi for CompletionClient {
    fn params_for(&self, prompt: &str) -> CompletionParams {
        CompletionParams {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: max_tokens_for(prompt),
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            prompt: prompt.to_string(),
        }
    }

    async fn complete(&self, api_key: &str, prompt: &str) -> Result<CompletionResponse, String> {
        let url = format!("{}/completions", self.base_url);
        let params = self.params_for(prompt);
        debug!(
            "Requesting completion from {} (prompt {} chars, max_tokens {})",
            url,
            prompt.chars().count(),
            params.max_tokens
        );

        let start_utc = Utc::now().timestamp();
        let started = Instant::now();

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(&params)
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {}", e))?;

        let response_ms = started.elapsed().as_millis() as u64;
        let status = response.status();

        if status.is_success() {
            let body: CompletionBody = response
                .json()
                .await
                .map_err(|e| format!("Failed to parse completion response: {}", e))?;
            let text = body
                .choices
                .first()
                .map(|c| c.text.clone())
                .ok_or_else(|| "Completion response has no choices".to_string())?;
            debug!(
                "Completion ok in {} ms ({} chars)",
                response_ms,
                text.chars().count()
            );
            Ok(CompletionResponse {
                status: status.as_u16(),
                start_utc,
                response_ms,
                params,
                result: CompletionResult::Success {
                    text,
                    usage: body.usage,
                },
            })
        } else {
            let message = match response.json::<ErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("API request failed with status {}", status),
            };
            debug!("Completion failed: {} ({})", message, status);
            Ok(CompletionResponse {
                status: status.as_u16(),
                start_utc,
                response_ms,
                params,
                result: CompletionResult::Failure { message },
            })
        }
    }
}
