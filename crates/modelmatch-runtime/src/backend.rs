//! The generation capability every compared model exposes.
//!
//! A [`Backend`] turns one prompt into one text. Retry and timeout policy
//! live here, inside the backend; callers see a single result per call.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;

use modelmatch_core::ModelEntry;

use crate::providers::{
    ChatMessage, CompletionConfig, Credentials, LlmProvider, ProviderError, ProviderRegistry,
};

/// A model that can generate text from a prompt.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Catalog model id, unique within a run.
    fn id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// A [`Backend`] driven by an [`LlmProvider`], with bounded retries.
pub struct ProviderBackend {
    id: String,
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    min_delay: Duration,
}

impl ProviderBackend {
    pub fn new(id: impl Into<String>, provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            id: id.into(),
            provider,
            config,
            min_delay: Duration::from_millis(500),
        }
    }

    /// Build the backend for a catalog entry.
    pub fn from_entry(
        entry: &ModelEntry,
        registry: &ProviderRegistry,
        credentials: &Credentials,
    ) -> Result<Self, ProviderError> {
        let options = entry.options_json();
        let config = CompletionConfig::from_options(&entry.model_id, &options)?;
        let provider = registry.create(&entry.provider, &options, credentials)?;

        tracing::debug!(
            model_id = %entry.model_id,
            provider = provider.name(),
            timeout = ?config.timeout,
            max_retries = config.max_retries,
            "Backend ready"
        );
        Ok(Self::new(entry.model_id.clone(), provider, config))
    }

    /// First backoff delay between retries.
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    async fn attempt(&self, prompt: &str) -> Result<String, ProviderError> {
        let messages = vec![ChatMessage::user(prompt)];
        let timeout = self.config.timeout;

        match tokio::time::timeout(timeout, self.provider.complete(messages, &self.config)).await {
            Ok(Ok(response)) => Ok(response.content),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ProviderError::Timeout(timeout)),
        }
    }
}

impl std::fmt::Debug for ProviderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderBackend")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl Backend for ProviderBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_times(self.config.max_retries)
            .with_jitter();

        (|| self.attempt(prompt))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(ProviderError::is_retryable)
            .notify(|err, delay| {
                tracing::warn!(
                    backend = %self.id,
                    error = %err,
                    retry_in = ?delay,
                    "Generation failed, retrying"
                );
            })
            .await
    }
}
