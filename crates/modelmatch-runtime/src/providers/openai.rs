//! OpenAI-compatible chat completions provider.
//!
//! Serves both OpenAI and OpenRouter, which exposes the same API shape at
//! its own base URL.
//!
//! ## Security
//!
//! Keys come from [`Credentials`] and are held as an [`ApiCredential`]; see
//! the [`secrets`](super::secrets) module.

use super::{
    factory::ProviderFactory, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, Credentials, LlmProvider, ProviderError, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Provider for any endpoint speaking the OpenAI chat completions API.
pub struct OpenAiProvider {
    name: &'static str,
    credential: ApiCredential,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(
        name: &'static str,
        credential: ApiCredential,
        base_url: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ProviderError::InvalidOption {
                key: "base_url".to_string(),
                message: "must start with http:// or https://".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::HttpError(e.to_string()))?;

        Ok(Self {
            name,
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn from_options(
        name: &'static str,
        default_base_url: &str,
        options: &JsonValue,
        credentials: &Credentials,
    ) -> Result<Self, ProviderError> {
        let credential = credentials.resolve(name, options)?;
        let base_url = options["base_url"].as_str().unwrap_or(default_base_url);
        Self::new(name, credential, base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Pull the provider's message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn parse_response(body: ChatResponse, provider: &str) -> Result<CompletionResponse, ProviderError> {
    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::EmptyResponse(provider.to_string()))?;

    let content = choice
        .message
        .content
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ProviderError::EmptyResponse(provider.to_string()))?;

    Ok(CompletionResponse {
        content,
        usage,
        model: body.model.unwrap_or_default(),
        stop_reason: choice.finish_reason,
    })
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = ChatRequest {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        // Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(config.timeout)
                } else {
                    ProviderError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(ProviderError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                error_message(&body),
            ));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let completion = parse_response(body, self.name)?;
        tracing::debug!(
            provider = self.name,
            model = %config.model,
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            "Completion received"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Factory for OpenAI providers.
///
/// ## Configuration Format
/// ```yaml
/// - model_id: gpt-4o
///   provider: openai
///   api_key: sk-...          # optional, falls back to OPENAI_API_KEY
///   base_url: https://...    # optional, custom endpoint
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["OpenAIModel"]
    }

    fn create(
        &self,
        options: &JsonValue,
        credentials: &Credentials,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = OpenAiProvider::from_options("openai", OPENAI_BASE_URL, options, credentials)?;
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "OpenAI chat completions"
    }
}

/// Factory for OpenRouter providers (OpenAI-compatible endpoint).
pub struct OpenRouterProviderFactory;

impl ProviderFactory for OpenRouterProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openrouter"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["OpenRouterModel", "open_router"]
    }

    fn create(
        &self,
        options: &JsonValue,
        credentials: &Credentials,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider =
            OpenAiProvider::from_options("openrouter", OPENROUTER_BASE_URL, options, credentials)?;
        Ok(Arc::new(provider))
    }

    fn description(&self) -> &'static str {
        "OpenRouter (OpenAI-compatible)"
    }
}
