//! Completion Client
//!
//! Builds and sends a single chat-completion request to an OpenAI-compatible
//! endpoint. Every call carries exactly two messages (system role and user
//! text), an optional generation cap, and a cancellation token. The client is
//! stateless and performs no retries.

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Failures surfaced by a completion call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// Transport-level failure: DNS, connect, timeout, reset.
    #[error("network failure: {0}")]
    NetworkFailure(String),
    /// The endpoint answered, but not with a usable success response.
    #[error("service error (status {status:?}): {}", message.as_deref().unwrap_or("no message"))]
    ServiceError {
        status: Option<u16>,
        message: Option<String>,
    },
    /// The request was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,
}

/// Input rejected before any request is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("input is empty")]
    EmptyInput,
}

/// A successful completion.
///
/// A reply without content is kept apart from failures so callers can decide
/// what to show for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    Empty,
}

impl Completion {
    /// Text shown in place of a reply that carried no content.
    pub const NO_RESPONSE: &'static str = "no response";

    /// Wraps the first choice's content, treating blank content as absent.
    pub fn from_content(content: Option<String>) -> Self {
        match content {
            Some(text) if !text.trim().is_empty() => Completion::Text(text),
            _ => Completion::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Completion::Empty)
    }

    /// Returns the reply text, or [`Completion::NO_RESPONSE`] when absent.
    pub fn into_text_or_fallback(self) -> String {
        match self {
            Completion::Text(text) => text,
            Completion::Empty => Self::NO_RESPONSE.to_string(),
        }
    }
}

/// One validated completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    system_role: String,
    user_text: String,
    max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Creates a request, rejecting user text that is empty after trimming.
    pub fn new(
        system_role: impl Into<String>,
        user_text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_text = user_text.into();
        if user_text.trim().is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        Ok(Self {
            system_role: system_role.into(),
            user_text,
            max_tokens: None,
        })
    }

    /// Caps the number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn system_role(&self) -> &str {
        &self.system_role
    }

    pub fn user_text(&self) -> &str {
        &self.user_text
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }
}

/// A generic client for a text-completion service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Sends one request and returns the first choice's text.
    ///
    /// Resolves to [`CompletionError::Cancelled`] as soon as `cancel` fires.
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion, CompletionError>;
}

/// Connection settings for [`HttpCompletionClient`].
#[derive(Debug)]
pub struct CompletionConfig {
    pub api_key: SecretString,
    /// Base URL of the API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Deadline for a single request, connect through body.
    pub timeout: Duration,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    #[serde(default)]
    message: Option<WireChoiceMessage>,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireErrorBody,
}

#[derive(Deserialize)]
struct WireErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// An implementation of `CompletionClient` for any OpenAI-compatible API.
pub struct HttpCompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl HttpCompletionClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - API key, base URL, model identifier and request deadline.
    pub fn new(config: CompletionConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));
        Ok(Self {
            http,
            endpoint,
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, request: &CompletionRequest) -> Result<Completion, CompletionError> {
        let body = WireRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: request.system_role(),
                },
                WireMessage {
                    role: "user",
                    content: request.user_text(),
                },
            ],
            max_tokens: request.max_tokens(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::NetworkFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // The error envelope is optional; a bare status is still a service error.
            let message = response
                .json::<WireErrorEnvelope>()
                .await
                .ok()
                .and_then(|envelope| envelope.error.message);
            warn!(status = status.as_u16(), ?message, "Completion endpoint returned an error");
            return Err(CompletionError::ServiceError {
                status: Some(status.as_u16()),
                message,
            });
        }

        let parsed: WireResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                CompletionError::ServiceError {
                    status: Some(status.as_u16()),
                    message: Some(format!("malformed response: {e}")),
                }
            } else {
                CompletionError::NetworkFailure(e.to_string())
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content);
        Ok(Completion::from_content(content))
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    #[instrument(name = "completion", skip_all, fields(model = %self.model, max_tokens = ?request.max_tokens()))]
    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<Completion, CompletionError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            result = self.send(&request) => result,
        };
        match &result {
            Ok(completion) => debug!(empty = completion.is_empty(), "Completion settled"),
            Err(e) => debug!(error = %e, "Completion failed"),
        }
        result
    }
}
