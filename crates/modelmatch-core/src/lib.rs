//! # modelmatch-core
//!
//! Deterministic building blocks for comparing language-model backends.
//!
//! This crate owns everything about a comparison run that does not talk to a
//! model backend:
//! - The data model (data points, raw output records, score records)
//! - Input file parsing and schema validation
//! - The model catalog and identifier resolution
//! - Prompt template rendering
//! - Leaderboard aggregation and result assembly
//!
//! ## Key Guarantees
//!
//! 1. **No backend calls**: generation and scoring live in `modelmatch-runtime`
//! 2. **Fail before cost**: every configuration problem surfaces as a
//!    [`ConfigError`] before a single generation call is made
//! 3. **Order independent**: aggregation is keyed by backend id, never by
//!    input or completion order
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelmatch_core::{Aggregator, InputData, ModelCatalog};
//!
//! let catalog = ModelCatalog::from_yaml_file("model_config.yaml")?;
//! let selected = catalog.resolve_selection(&["gpt-4o", "Gemini Flash"])?;
//! let input = InputData::from_json_file("input.json")?;
//! let prompts = input.render_prompts()?;
//! ```

pub mod aggregator;
pub mod catalog;
pub mod input;
pub mod result;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use aggregator::{Aggregator, Leaderboard, Standing, StandingStatus};
pub use catalog::{ModelCatalog, ModelEntry};
pub use input::{validate_input_schema, InputData};
pub use result::{ComparisonResult, EvaluationSummary, ResultAssembler, RunSummary};
pub use template::{render, render_fields, TemplateError};
pub use types::{
    DataPoint, DataPointOutputs, DataPointScores, EvalMethod, OutputRecord, RunParameters, Score,
    ScoreError, ScoreInput, ScoreIssue, ScoreRecord, FAILURE_PREFIX, MAX_BACKENDS, MIN_BACKENDS,
};

use std::path::PathBuf;
use thiserror::Error;

/// Configuration problems that stop a run before any backend is called.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Input file does not match the expected structure: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid model catalog: {0}")]
    InvalidCatalog(String),

    #[error("Duplicate model id '{0}' in model catalog")]
    DuplicateModelId(String),

    #[error("Duplicate display name '{display_name}' in model catalog (used by '{first}' and '{second}')")]
    DuplicateDisplayName {
        display_name: String,
        first: String,
        second: String,
    },

    #[error("Model '{name}' not found. Available models: {}", .available.join(", "))]
    UnknownModel {
        name: String,
        available: Vec<String>,
    },

    #[error("Model name '{name}' is ambiguous: it matches {}", .candidates.join(" and "))]
    AmbiguousModel {
        name: String,
        candidates: Vec<String>,
    },

    #[error("At most {max} models can be compared in one run, got {count}")]
    TooManyBackends { count: usize, max: usize },

    #[error("At least {min} distinct models are needed for a comparison, got {count}")]
    TooFewBackends { count: usize, min: usize },

    #[error("A reasoning model is required when the evaluation method is 'reasoning'")]
    MissingReasoningBackend,

    #[error("A reasoning model is only used by the 'reasoning' evaluation method")]
    UnexpectedReasoningBackend,

    #[error("Concurrency limit must be at least 1")]
    InvalidConcurrency,

    #[error("Cannot render prompt for data point {index}: {source}")]
    Template {
        index: usize,
        #[source]
        source: TemplateError,
    },

    #[error("Invalid reasoning prompt template: {0}")]
    ReasoningTemplate(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
