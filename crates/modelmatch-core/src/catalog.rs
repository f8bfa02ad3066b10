//! Model catalog: the configured backends and how users name them.
//!
//! The catalog is loaded from YAML:
//!
//! ```yaml
//! models:
//!   - model_id: gpt-4o
//!     display_name: GPT-4o
//!     provider: openai
//!   - model_id: gemini-2.0-flash
//!     display_name: Gemini Flash
//!     provider: google
//!     timeout: 45s
//! ```
//!
//! Any key besides `model_id`, `display_name` and `provider` is kept as a
//! provider option and handed to the provider factory untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::types::{MAX_BACKENDS, MIN_BACKENDS};
use crate::ConfigError;

/// One configured backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// API model id, unique within the catalog
    pub model_id: String,

    /// Human-facing name, unique within the catalog (defaults to the id)
    #[serde(default)]
    pub display_name: String,

    /// Provider type, e.g. "openai", "openrouter", "google"
    pub provider: String,

    /// Provider-specific options
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ModelEntry {
    pub fn new(
        model_id: impl Into<String>,
        display_name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            display_name: display_name.into(),
            provider: provider.into(),
            options: serde_json::Map::new(),
        }
    }

    /// Options as a JSON object, for provider factories.
    pub fn options_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.options.clone())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    models: Option<Vec<ModelEntry>>,
}

/// The set of backends a run may select from.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    entries: Vec<ModelEntry>,
    by_id: BTreeMap<String, usize>,
    by_display_name: BTreeMap<String, usize>,
}

impl ModelCatalog {
    /// Build a catalog, rejecting duplicate ids and display names.
    pub fn new(entries: Vec<ModelEntry>) -> Result<Self, ConfigError> {
        let mut catalog = ModelCatalog::default();

        for mut entry in entries {
            entry.model_id = entry.model_id.trim().to_string();
            entry.display_name = entry.display_name.trim().to_string();
            entry.provider = entry.provider.trim().to_string();

            if entry.model_id.is_empty() {
                return Err(ConfigError::InvalidCatalog(
                    "every model needs a non-empty 'model_id'".to_string(),
                ));
            }
            if entry.provider.is_empty() {
                return Err(ConfigError::InvalidCatalog(format!(
                    "model '{}' has no 'provider'",
                    entry.model_id
                )));
            }
            if entry.display_name.is_empty() {
                entry.display_name = entry.model_id.clone();
            }

            if catalog.by_id.contains_key(&entry.model_id) {
                return Err(ConfigError::DuplicateModelId(entry.model_id));
            }
            if let Some(&existing) = catalog.by_display_name.get(&entry.display_name) {
                return Err(ConfigError::DuplicateDisplayName {
                    display_name: entry.display_name,
                    first: catalog.entries[existing].model_id.clone(),
                    second: entry.model_id,
                });
            }

            let index = catalog.entries.len();
            catalog.by_id.insert(entry.model_id.clone(), index);
            catalog
                .by_display_name
                .insert(entry.display_name.clone(), index);
            catalog.entries.push(entry);
        }

        tracing::debug!(models = catalog.entries.len(), "Model catalog loaded");
        Ok(catalog)
    }

    /// Parse a catalog from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        let models = file.models.ok_or_else(|| {
            ConfigError::InvalidCatalog("expected a list under the 'models' key".to_string())
        })?;
        Self::new(models)
    }

    /// Parse a catalog from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::from_yaml(&contents)
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelEntry> {
        self.by_id.get(model_id).map(|&i| &self.entries[i])
    }

    /// Entries sorted by display name, for help text and listings.
    pub fn sorted_by_display_name(&self) -> Vec<&ModelEntry> {
        self.by_display_name
            .values()
            .map(|&i| &self.entries[i])
            .collect()
    }

    /// Resolve a user-supplied model id or display name.
    ///
    /// A name that is the id of one model and the display name of another
    /// is rejected as ambiguous.
    pub fn resolve(&self, name: &str) -> Result<&ModelEntry, ConfigError> {
        let name = name.trim();
        let by_id = self.by_id.get(name).copied();
        let by_display = self.by_display_name.get(name).copied();

        match (by_id, by_display) {
            (Some(a), Some(b)) if a != b => Err(ConfigError::AmbiguousModel {
                name: name.to_string(),
                candidates: vec![
                    format!("model id '{}'", self.entries[a].model_id),
                    format!(
                        "display name of '{}'",
                        self.entries[b].model_id
                    ),
                ],
            }),
            (Some(i), _) | (None, Some(i)) => Ok(&self.entries[i]),
            (None, None) => Err(ConfigError::UnknownModel {
                name: name.to_string(),
                available: self
                    .sorted_by_display_name()
                    .into_iter()
                    .map(|e| format!("\"{}\" ({})", e.display_name, e.model_id))
                    .collect(),
            }),
        }
    }

    /// Resolve the backends selected for a run.
    ///
    /// Names that resolve to an already selected model are dropped with a
    /// warning. The distinct selection must hold between
    /// [`MIN_BACKENDS`] and [`MAX_BACKENDS`] models.
    pub fn resolve_selection<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<&ModelEntry>, ConfigError> {
        let mut selected: Vec<&ModelEntry> = Vec::new();

        for name in names.iter().map(AsRef::as_ref) {
            if name.trim().is_empty() {
                continue;
            }
            let entry = self.resolve(name)?;
            if selected.iter().any(|e| e.model_id == entry.model_id) {
                tracing::warn!(
                    name = name,
                    model_id = %entry.model_id,
                    "Model selected more than once, using it once"
                );
                continue;
            }
            selected.push(entry);
        }

        if selected.len() > MAX_BACKENDS {
            return Err(ConfigError::TooManyBackends {
                count: selected.len(),
                max: MAX_BACKENDS,
            });
        }
        if selected.len() < MIN_BACKENDS {
            return Err(ConfigError::TooFewBackends {
                count: selected.len(),
                min: MIN_BACKENDS,
            });
        }

        Ok(selected)
    }
}
