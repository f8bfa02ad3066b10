//! Secure credential handling for LLM providers.
//!
//! API keys are read once at process start into a [`Credentials`] value and
//! passed by reference to provider factories. Nothing below the CLI reads
//! the environment on its own.
//!
//! - **No accidental logging**: credentials cannot appear in Debug/Display output
//! - **Zeroed on drop**: values live in a `secrecy::SecretString`
//!
//! ## Usage
//!
//! ```ignore
//! let credentials = Credentials::from_env();
//! let key = credentials.resolve("openai", &entry.options_json())?;
//!
//! // Use in HTTP header (explicit exposure)
//! request.bearer_auth(key.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Per-model `api_key` in the model catalog
    Config,
    /// Environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` show `[REDACTED]`; the value is only reachable
/// through [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the value is actually needed (an HTTP header or
    /// query parameter). Never store the exposed value.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().trim().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.source, self.name)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

/// Where each built-in provider looks for its key.
struct KeySpec {
    provider: &'static str,
    env_vars: &'static [&'static str],
    name: &'static str,
}

const KEY_SPECS: &[KeySpec] = &[
    KeySpec {
        provider: "openai",
        env_vars: &["OPENAI_API_KEY"],
        name: "OpenAI API key",
    },
    KeySpec {
        provider: "openrouter",
        env_vars: &["OPEN_ROUTER_API_KEY", "OPENROUTER_API_KEY"],
        name: "OpenRouter API key",
    },
    KeySpec {
        provider: "google",
        env_vars: &["GOOGLE_API_KEY"],
        name: "Google API key",
    },
];

fn spec_for(provider: &str) -> Option<&'static KeySpec> {
    KEY_SPECS.iter().find(|s| s.provider == provider)
}

/// API keys for every provider, loaded once.
#[derive(Default, Clone)]
pub struct Credentials {
    keys: BTreeMap<String, ApiCredential>,
}

impl Credentials {
    /// No keys at all; providers then need a per-model `api_key`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read the known provider keys from the environment.
    ///
    /// Missing variables are not an error here; a provider that needs an
    /// absent key fails when it is built.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read the known provider keys through a lookup function.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials = Self::empty();
        for spec in KEY_SPECS {
            let found = spec
                .env_vars
                .iter()
                .find_map(|var| lookup(var).filter(|v| !v.trim().is_empty()));
            if let Some(value) = found {
                credentials.keys.insert(
                    spec.provider.to_string(),
                    ApiCredential::new(value, CredentialSource::Environment, spec.name),
                );
            }
        }
        tracing::debug!(providers = ?credentials.providers(), "Loaded API keys");
        credentials
    }

    /// Set a key programmatically.
    pub fn with_key(mut self, provider: &str, value: impl Into<String>) -> Self {
        let name = spec_for(provider).map_or("API key", |s| s.name);
        self.keys.insert(
            provider.to_string(),
            ApiCredential::new(value, CredentialSource::Programmatic, name),
        );
        self
    }

    pub fn get(&self, provider: &str) -> Option<&ApiCredential> {
        self.keys.get(provider)
    }

    /// Providers that have a key.
    pub fn providers(&self) -> Vec<&str> {
        self.keys.keys().map(String::as_str).collect()
    }

    /// Key for one model: a per-model `api_key` option wins over the
    /// provider-wide key.
    pub fn resolve(&self, provider: &str, options: &JsonValue) -> Result<ApiCredential, ProviderError> {
        let spec = spec_for(provider);
        let name = spec.map_or("API key", |s| s.name);

        if let Some(value) = options.get("api_key").and_then(JsonValue::as_str) {
            let credential = ApiCredential::new(value, CredentialSource::Config, name);
            if !credential.is_empty() {
                return Ok(credential);
            }
        }

        if let Some(credential) = self.keys.get(provider).filter(|c| !c.is_empty()) {
            return Ok(credential.clone());
        }

        let env_hint = spec
            .map(|s| s.env_vars.join(" or "))
            .unwrap_or_else(|| "the provider's key variable".to_string());
        Err(ProviderError::NotConfigured(format!(
            "{} required: set 'api_key' in the model config or {}",
            name, env_hint
        )))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("providers", &self.providers())
            .finish()
    }
}
