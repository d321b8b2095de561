//! # LLM Client Module
//!
//! Minimal client for OpenAI-compatible `chat/completions` endpoints,
//! guarded by a [`CircuitBreaker`].

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{LlmSettings, RecoveryConfig};
use crate::prompt::Prompt;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("circuit breaker is open, skipping language model call")]
    CircuitOpen,

    #[error("request to language model failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("language model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("language model response has no choices")]
    NoChoices,

    #[error("language model returned empty content")]
    EmptyContent,
}

/// Anything that can turn a prompt into an answer
pub trait ChatModel: Send + Sync {
    fn complete(&self, prompt: &Prompt) -> impl Future<Output = Result<String, LlmError>> + Send;
}

/// Sampling parameters sent with every request
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: 600,
            top_p: 0.9,
            frequency_penalty: 0.2,
            presence_penalty: 0.2,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct LlmClient {
    http: reqwest::Client,
    settings: LlmSettings,
    params: GenerationParams,
    breaker: CircuitBreaker,
}

impl LlmClient {
    pub fn new(settings: LlmSettings, recovery: &RecoveryConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            http,
            settings,
            params: GenerationParams::default(),
            breaker: CircuitBreaker::new(recovery),
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Whether the API answers `GET /models` with the configured key
    pub async fn check_connection(&self) -> bool {
        let url = format!("{}/models", self.settings.base_url);
        match self.http.get(&url).bearer_auth(&self.settings.api_key).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Language model connection check rejected");
                false
            }
            Err(err) => {
                warn!(error = %err, "Language model connection check failed");
                false
            }
        }
    }

    async fn request(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let body = ChatRequest {
            model: &self.settings.model,
            messages: [
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
            top_p: self.params.top_p,
            frequency_penalty: self.params.frequency_penalty,
            presence_penalty: self.params.presence_penalty,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            match status {
                StatusCode::FORBIDDEN => warn!("Language model rejected the API key or region"),
                StatusCode::TOO_MANY_REQUESTS => warn!("Language model rate limit exceeded"),
                _ => {}
            }
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed.choices.into_iter().next().ok_or(LlmError::NoChoices)?;
        let content = choice.message.content.unwrap_or_default();
        let content = content.trim();

        if content.is_empty() {
            return Err(LlmError::EmptyContent);
        }

        Ok(content.to_string())
    }
}

impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, LlmError> {
        if self.breaker.is_open() {
            debug!("Skipping language model call, circuit open");
            return Err(LlmError::CircuitOpen);
        }

        match self.request(prompt).await {
            Ok(answer) => {
                self.breaker.record_success();
                info!(model = %self.settings.model, chars = answer.chars().count(), "Language model answered");
                Ok(answer)
            }
            Err(err) => {
                self.breaker.record_failure();
                warn!(error = %err, failures = self.breaker.failure_count(), "Language model call failed");
                Err(err)
            }
        }
    }
}
