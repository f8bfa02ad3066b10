//! Core data model for a comparison run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::ConfigError;

/// Hard upper bound on backends compared in one run.
pub const MAX_BACKENDS: usize = 3;

/// Fewest backends that make a comparison.
pub const MIN_BACKENDS: usize = 2;

/// Reserved prefix carried by every failure record.
pub const FAILURE_PREFIX: &str = "ERROR: ";

/// One unit of input used to fill the prompt template once.
///
/// Identity is the position in the input list, not the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPoint {
    /// A bare string, substituted for the `{data}` placeholder
    Text(String),

    /// Named fields, each substituted for its own placeholder
    Fields(serde_json::Map<String, serde_json::Value>),
}

impl DataPoint {
    /// Text form used when the data point is shown to a human or a reasoning model.
    pub fn to_prompt_string(&self) -> String {
        match self {
            DataPoint::Text(text) => text.clone(),
            DataPoint::Fields(fields) => serde_json::to_string_pretty(fields)
                .unwrap_or_else(|_| format!("{:?}", fields)),
        }
    }
}

impl From<&str> for DataPoint {
    fn from(text: &str) -> Self {
        DataPoint::Text(text.to_string())
    }
}

/// Scoring protocol selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMethod {
    Human,
    Reasoning,
}

impl EvalMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvalMethod::Human => "human",
            EvalMethod::Reasoning => "reasoning",
        }
    }
}

impl fmt::Display for EvalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(EvalMethod::Human),
            "reasoning" => Ok(EvalMethod::Reasoning),
            other => Err(format!(
                "unsupported evaluation method '{}': expected 'human' or 'reasoning'",
                other
            )),
        }
    }
}

/// Parameters of a run. Built once from external input and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParameters {
    /// Input data file
    pub input_file: PathBuf,

    /// Resolved backend ids, in selection order
    pub backends: Vec<String>,

    /// Evaluation method
    pub method: EvalMethod,

    /// Resolved reasoning backend id (reasoning method only)
    pub reasoning_backend: Option<String>,

    /// Maximum concurrent backend calls (`None` lets the runtime decide)
    pub concurrency: Option<usize>,

    /// Where the result structure is persisted
    pub output_file: PathBuf,
}

impl RunParameters {
    /// Check the cross-field rules of a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for id in &self.backends {
            if !seen.insert(id.as_str()) {
                return Err(ConfigError::InvalidInput(format!(
                    "model '{}' is selected more than once",
                    id
                )));
            }
        }

        if self.backends.len() > MAX_BACKENDS {
            return Err(ConfigError::TooManyBackends {
                count: self.backends.len(),
                max: MAX_BACKENDS,
            });
        }
        if self.backends.len() < MIN_BACKENDS {
            return Err(ConfigError::TooFewBackends {
                count: self.backends.len(),
                min: MIN_BACKENDS,
            });
        }

        match (self.method, &self.reasoning_backend) {
            (EvalMethod::Reasoning, None) => return Err(ConfigError::MissingReasoningBackend),
            (EvalMethod::Human, Some(_)) => return Err(ConfigError::UnexpectedReasoningBackend),
            _ => {}
        }

        if self.concurrency == Some(0) {
            return Err(ConfigError::InvalidConcurrency);
        }

        Ok(())
    }
}

/// Result of one backend's attempt at one data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutputRecord {
    Success { text: String },
    Failure { error: String },
}

impl OutputRecord {
    pub fn success(text: impl Into<String>) -> Self {
        OutputRecord::Success { text: text.into() }
    }

    /// Build a failure record; the message always carries [`FAILURE_PREFIX`].
    pub fn failure(error: impl fmt::Display) -> Self {
        OutputRecord::Failure {
            error: format!("{}{}", FAILURE_PREFIX, error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutputRecord::Success { .. })
    }

    /// Generated text, if the call succeeded.
    pub fn text(&self) -> Option<&str> {
        match self {
            OutputRecord::Success { text } => Some(text),
            OutputRecord::Failure { .. } => None,
        }
    }
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputRecord::Success { text } => f.write_str(text),
            OutputRecord::Failure { error } => f.write_str(error),
        }
    }
}

/// All raw output records for one data point, keyed by backend id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointOutputs {
    pub data_point_index: usize,
    pub data: DataPoint,

    /// The rendered prompt every backend received
    pub prompt: String,

    pub outputs: BTreeMap<String, OutputRecord>,
}

impl DataPointOutputs {
    /// Backends with a usable output, as `(backend_id, text)` in id order.
    pub fn successful(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outputs
            .iter()
            .filter_map(|(id, record)| record.text().map(|text| (id.as_str(), text)))
    }

    pub fn has_success(&self) -> bool {
        self.outputs.values().any(OutputRecord::is_success)
    }
}

/// Errors from interpreting a raw score value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("'{0}' is not an integer")]
    NotAnInteger(String),

    #[error("score {0} is outside the range 0-10")]
    OutOfRange(i64),
}

/// A valid score, always in `1..=10`.
///
/// Zero is not a score: it means the output was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Score(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = ScoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Score::new(value).ok_or(ScoreError::OutOfRange(value as i64))
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A raw 0-10 entry from a human or a reasoning model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreInput {
    /// Zero: no score is recorded
    Skip,
    Scored(Score),
}

impl ScoreInput {
    /// Interpret an integer entry. Out-of-range values are rejected, never clamped.
    pub fn from_value(value: i64) -> Result<Self, ScoreError> {
        match value {
            0 => Ok(ScoreInput::Skip),
            1..=10 => Ok(ScoreInput::Scored(Score(value as u8))),
            other => Err(ScoreError::OutOfRange(other)),
        }
    }

    pub fn score(&self) -> Option<Score> {
        match self {
            ScoreInput::Skip => None,
            ScoreInput::Scored(score) => Some(*score),
        }
    }
}

impl FromStr for ScoreInput {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ScoreError::NotAnInteger(trimmed.to_string()))?;
        Self::from_value(value)
    }
}

/// A backend's score for one data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub score: Score,

    /// Free-text justification (reasoning method only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

impl ScoreRecord {
    pub fn new(score: Score) -> Self {
        Self {
            score,
            justification: None,
        }
    }

    pub fn with_justification(score: Score, justification: impl Into<String>) -> Self {
        Self {
            score,
            justification: Some(justification.into()),
        }
    }
}

/// A recoverable problem met while scoring one data point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoreIssue {
    /// The reasoning backend call failed
    BackendCall { message: String },

    /// The reasoning response held no usable JSON object
    UnparseableResponse { message: String },

    /// A label that was sent has no entry in the response
    MissingLabel { model_id: String },

    /// An entry is present but its score is unusable
    InvalidScore { model_id: String, message: String },
}

impl fmt::Display for ScoreIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreIssue::BackendCall { message } => write!(f, "reasoning call failed: {}", message),
            ScoreIssue::UnparseableResponse { message } => {
                write!(f, "unparseable reasoning response: {}", message)
            }
            ScoreIssue::MissingLabel { model_id } => {
                write!(f, "no score returned for '{}'", model_id)
            }
            ScoreIssue::InvalidScore { model_id, message } => {
                write!(f, "invalid score for '{}': {}", model_id, message)
            }
        }
    }
}

/// Score records and issues for one data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPointScores {
    pub data_point_index: usize,
    pub data: DataPoint,
    pub scores: BTreeMap<String, ScoreRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ScoreIssue>,
}

impl DataPointScores {
    pub fn new(data_point_index: usize, data: DataPoint) -> Self {
        Self {
            data_point_index,
            data,
            scores: BTreeMap::new(),
            issues: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(backends: &[&str], method: EvalMethod, reasoning: Option<&str>) -> RunParameters {
        RunParameters {
            input_file: PathBuf::from("input.json"),
            backends: backends.iter().map(|s| s.to_string()).collect(),
            method,
            reasoning_backend: reasoning.map(str::to_string),
            concurrency: None,
            output_file: PathBuf::from("out.json"),
        }
    }

    #[test]
    fn test_data_point_deserializes_both_shapes() {
        let points: Vec<DataPoint> =
            serde_json::from_str(r#"["plain", {"topic": "rust", "n": 3}]"#).unwrap();
        assert_eq!(points[0], DataPoint::Text("plain".to_string()));
        assert!(matches!(points[1], DataPoint::Fields(ref f) if f.len() == 2));
    }

    #[test]
    fn test_failure_record_is_prefixed() {
        let record = OutputRecord::failure("rate limited");
        assert!(!record.is_success());
        assert_eq!(record.to_string(), "ERROR: rate limited");
        assert!(record.text().is_none());
    }

    #[test]
    fn test_output_record_serializes_with_status_tag() {
        let json = serde_json::to_value(OutputRecord::success("OK")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["text"], "OK");
    }

    #[test]
    fn test_score_input_zero_is_skip() {
        assert_eq!("0".parse::<ScoreInput>().unwrap(), ScoreInput::Skip);
        assert_eq!(
            " 7 ".parse::<ScoreInput>().unwrap().score().map(|s| s.value()),
            Some(7)
        );
    }

    #[test]
    fn test_score_input_rejects_without_clamping() {
        assert_eq!(
            "11".parse::<ScoreInput>(),
            Err(ScoreError::OutOfRange(11))
        );
        assert_eq!(ScoreInput::from_value(-1), Err(ScoreError::OutOfRange(-1)));
        assert!(matches!(
            "seven".parse::<ScoreInput>(),
            Err(ScoreError::NotAnInteger(_))
        ));
        assert!(matches!(
            "7.5".parse::<ScoreInput>(),
            Err(ScoreError::NotAnInteger(_))
        ));
    }

    #[test]
    fn test_score_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Score>("0").is_err());
        assert_eq!(serde_json::from_str::<Score>("10").unwrap().value(), 10);
    }

    #[test]
    fn test_run_parameters_reasoning_requires_backend() {
        let p = params(&["a", "b"], EvalMethod::Reasoning, None);
        assert!(matches!(p.validate(), Err(ConfigError::MissingReasoningBackend)));

        let p = params(&["a", "b"], EvalMethod::Reasoning, Some("judge"));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_run_parameters_human_rejects_reasoning_backend() {
        let p = params(&["a", "b"], EvalMethod::Human, Some("judge"));
        assert!(matches!(
            p.validate(),
            Err(ConfigError::UnexpectedReasoningBackend)
        ));
    }

    #[test]
    fn test_run_parameters_backend_bounds() {
        let p = params(&["a", "b", "c", "d"], EvalMethod::Human, None);
        assert!(matches!(
            p.validate(),
            Err(ConfigError::TooManyBackends { count: 4, max: 3 })
        ));

        let p = params(&["a"], EvalMethod::Human, None);
        assert!(matches!(p.validate(), Err(ConfigError::TooFewBackends { .. })));

        let p = params(&["a", "a"], EvalMethod::Human, None);
        assert!(matches!(p.validate(), Err(ConfigError::InvalidInput(_))));
    }

    #[test]
    fn test_run_parameters_zero_concurrency() {
        let mut p = params(&["a", "b"], EvalMethod::Human, None);
        p.concurrency = Some(0);
        assert!(matches!(p.validate(), Err(ConfigError::InvalidConcurrency)));
    }

    #[test]
    fn test_eval_method_parse() {
        assert_eq!("Human".parse::<EvalMethod>().unwrap(), EvalMethod::Human);
        assert_eq!(
            "reasoning".parse::<EvalMethod>().unwrap(),
            EvalMethod::Reasoning
        );
        assert!("vibes".parse::<EvalMethod>().is_err());
    }

    #[test]
    fn test_successful_outputs_skip_failures() {
        let mut outputs = BTreeMap::new();
        outputs.insert("a".to_string(), OutputRecord::success("hello"));
        outputs.insert("b".to_string(), OutputRecord::failure("boom"));
        let point = DataPointOutputs {
            data_point_index: 0,
            data: DataPoint::from("x"),
            prompt: "p".to_string(),
            outputs,
        };
        let ok: Vec<_> = point.successful().collect();
        assert_eq!(ok, vec![("a", "hello")]);
        assert!(point.has_success());
    }
}
