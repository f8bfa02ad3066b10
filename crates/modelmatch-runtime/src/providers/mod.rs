//! LLM provider abstractions for modelmatch-runtime.
//!
//! This module defines the trait for LLM providers and includes
//! implementations for OpenAI-compatible APIs (OpenAI, OpenRouter) and
//! Google Gemini, each behind its own cargo feature.
//!
//! ## Security
//!
//! All providers take their keys from the [`secrets`] module.
//! See [`ApiCredential`] and [`Credentials`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "google")]
mod google;
#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource, Credentials};

#[cfg(feature = "google")]
pub use google::{GoogleProvider, GoogleProviderFactory};
#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OpenAiProviderFactory, OpenRouterProviderFactory};

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid provider option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

impl ProviderError {
    /// Whether another attempt of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::HttpError(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::Timeout(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => ProviderError::AuthError(message),
            429 => ProviderError::RateLimited { retry_after: None },
            _ => ProviderError::ApiError { status, message },
        }
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,

    /// Retries for retryable failures, on top of the first attempt
    pub max_retries: usize,
}

impl CompletionConfig {
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;
    pub const DEFAULT_TEMPERATURE: f32 = 0.7;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_RETRIES: usize = 2;

    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Build from a catalog entry's options.
    ///
    /// Recognized keys: `max_tokens`, `temperature`, `timeout` (a humantime
    /// string such as `"30s"`, or a number of seconds) and `max_retries`.
    pub fn from_options(model: impl Into<String>, options: &JsonValue) -> Result<Self, ProviderError> {
        let mut config = Self::new(model);

        if let Some(value) = options.get("max_tokens") {
            config.max_tokens = value
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| invalid_option("max_tokens", "expected a positive integer"))?;
        }

        if let Some(value) = options.get("temperature") {
            let temperature = value
                .as_f64()
                .ok_or_else(|| invalid_option("temperature", "expected a number"))?;
            if !(0.0..=2.0).contains(&temperature) {
                return Err(invalid_option("temperature", "expected a value between 0 and 2"));
            }
            config.temperature = temperature as f32;
        }

        if let Some(value) = options.get("timeout") {
            config.timeout = match value {
                JsonValue::String(s) => humantime::parse_duration(s)
                    .map_err(|e| invalid_option("timeout", &e.to_string()))?,
                JsonValue::Number(n) => n
                    .as_u64()
                    .map(Duration::from_secs)
                    .ok_or_else(|| invalid_option("timeout", "expected whole seconds"))?,
                _ => return Err(invalid_option("timeout", "expected a duration like \"30s\"")),
            };
            if config.timeout.is_zero() {
                return Err(invalid_option("timeout", "must be greater than zero"));
            }
        }

        if let Some(value) = options.get("max_retries") {
            config.max_retries = value
                .as_u64()
                .map(|v| v as usize)
                .ok_or_else(|| invalid_option("max_retries", "expected a non-negative integer"))?;
        }

        Ok(config)
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            timeout: Self::DEFAULT_TIMEOUT,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        }
    }
}

fn invalid_option(key: &str, message: &str) -> ProviderError {
    ProviderError::InvalidOption {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// This is the only place where HTTP calls to model APIs are made.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
