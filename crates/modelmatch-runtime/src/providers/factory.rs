//! Provider factory pattern for LLM provider registration.
//!
//! The registry is a lookup table built once at startup: provider type names
//! (and their aliases) map to factories that build configured providers.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let credentials = Credentials::from_env();
//!
//! let provider = registry.create("openai", &entry.options_json(), &credentials)?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{Credentials, LlmProvider, ProviderError};

/// Factory for creating LLM providers from configuration.
pub trait ProviderFactory: Send + Sync {
    /// Unique identifier for this provider type, e.g. "openai".
    fn provider_type(&self) -> &'static str;

    /// Other names accepted for this provider type in the model catalog.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Create a provider instance from a catalog entry's options.
    fn create(
        &self,
        options: &JsonValue,
        credentials: &Credentials,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError>;

    /// Human-readable description of this provider.
    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
    aliases: BTreeMap<String, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory.
    ///
    /// If a factory with the same type already exists, it will be replaced.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        let provider_type = factory.provider_type().to_string();
        for alias in factory.aliases() {
            self.aliases
                .insert(alias.to_lowercase(), provider_type.clone());
        }
        self.factories.insert(provider_type, factory);
    }

    /// Canonical provider type for a catalog name or alias.
    ///
    /// Lookup ignores case.
    pub fn canonical_type(&self, name: &str) -> Option<&str> {
        let key = name.trim().to_lowercase();
        if let Some((canonical, _)) = self.factories.get_key_value(&key) {
            return Some(canonical.as_str());
        }
        self.aliases.get(&key).map(String::as_str)
    }

    /// Create a provider from a type name (or alias) and options.
    pub fn create(
        &self,
        provider_type: &str,
        options: &JsonValue,
        credentials: &Credentials,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let factory = self
            .canonical_type(provider_type)
            .and_then(|canonical| self.factories.get(canonical))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "Unknown provider type: '{}'. Available: {:?}",
                    provider_type,
                    self.available_types()
                ))
            })?;

        factory.create(options, credentials)
    }

    /// List available provider types.
    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.canonical_type(provider_type).is_some()
    }

    /// Create a registry with every provider compiled into this build.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "openai")]
        {
            registry.register(Arc::new(super::OpenAiProviderFactory));
            registry.register(Arc::new(super::OpenRouterProviderFactory));
        }
        #[cfg(feature = "google")]
        registry.register(Arc::new(super::GoogleProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}
