//! Scoring by a reasoning model acting as judge.
//!
//! For every data point with at least one successful output, the judge gets
//! one prompt holding the original prompt, the data point, and the outputs
//! under opaque labels. Its JSON reply is translated back to backend ids and
//! the labels are dropped.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

use modelmatch_core::{
    DataPointOutputs, DataPointScores, EvalMethod, ScoreInput, ScoreIssue, ScoreRecord,
};

use super::{EvaluationError, EvaluationOutcome, Evaluator};
use crate::backend::Backend;
use crate::prompts::ReasoningPrompt;

/// Opaque labels for the outputs of one judge call.
///
/// Labels are assigned in backend-id order: `Output A`, `Output B`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymizationMap {
    // (label, backend id)
    entries: Vec<(String, String)>,
}

impl AnonymizationMap {
    pub fn new<'a>(backend_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let entries = backend_ids
            .into_iter()
            .enumerate()
            .map(|(i, id)| (label(i), id.to_string()))
            .collect();
        Self { entries }
    }

    pub fn label_for(&self, backend_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, id)| id == backend_id)
            .map(|(label, _)| label.as_str())
    }

    pub fn backend_for(&self, label: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, id)| id.as_str())
    }

    /// `(label, backend id)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, id)| (l.as_str(), id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn label(index: usize) -> String {
    match u8::try_from(index).ok().filter(|i| *i < 26) {
        Some(i) => format!("Output {}", (b'A' + i) as char),
        None => format!("Output {}", index + 1),
    }
}

/// Extract the label-to-entry object from a judge reply.
///
/// The JSON is taken from the first `{` to the last `}`, so prose or code
/// fences around it are tolerated. Both `{"scores": {...}}` and a bare
/// label object are accepted.
pub fn parse_reasoning_response(response: &str) -> Result<Map<String, JsonValue>, String> {
    let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) else {
        return Err("no JSON object found in response".to_string());
    };
    if start >= end {
        return Err("no JSON object found in response".to_string());
    }

    let value: JsonValue =
        serde_json::from_str(&response[start..=end]).map_err(|e| format!("invalid JSON: {}", e))?;

    match value {
        JsonValue::Object(mut object) => match object.remove("scores") {
            Some(JsonValue::Object(scores)) => Ok(scores),
            Some(other) => Err(format!("'scores' must be an object, got {}", json_kind(&other))),
            None => Ok(object),
        },
        other => Err(format!("expected a JSON object, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// One label's entry: `{"score": n, "reasoning": s}` or a bare score.
fn parse_entry(entry: &JsonValue) -> Result<(ScoreInput, Option<String>), String> {
    let (raw, justification) = match entry {
        JsonValue::Object(fields) => {
            let raw = fields
                .get("score")
                .ok_or_else(|| "entry has no 'score' field".to_string())?;
            let justification = fields
                .get("reasoning")
                .or_else(|| fields.get("justification"))
                .and_then(JsonValue::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            (raw, justification)
        }
        other => (other, None),
    };

    let value = match raw {
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e9 => f as i64,
            _ => return Err(format!("score {} is not an integer", n)),
        },
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("score '{}' is not an integer", s))?,
        other => return Err(format!("score is {}, expected an integer", json_kind(other))),
    };

    let input = ScoreInput::from_value(value).map_err(|e| e.to_string())?;
    Ok((input, justification))
}

/// Evaluator that asks a reasoning backend to score every data point.
pub struct ReasoningEvaluator {
    backend: Arc<dyn Backend>,
    prompt: ReasoningPrompt,
    concurrency: usize,
}

/// What happened to one data point's judge call.
enum CallResult {
    NotAttempted,
    Succeeded,
    Failed(String),
}

impl ReasoningEvaluator {
    pub fn new(backend: Arc<dyn Backend>, prompt: ReasoningPrompt, concurrency: usize) -> Self {
        Self {
            backend,
            prompt,
            concurrency: concurrency.max(1),
        }
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    async fn score_point(&self, point: &DataPointOutputs) -> (DataPointScores, CallResult) {
        let index = point.data_point_index;
        let mut scores = DataPointScores::new(index, point.data.clone());

        if !point.has_success() {
            tracing::warn!(data_point = index, "No successful outputs to score");
            return (scores, CallResult::NotAttempted);
        }

        let labels = AnonymizationMap::new(point.successful().map(|(id, _)| id));
        let labeled: Vec<(String, &str)> = labels
            .iter()
            .zip(point.successful())
            .map(|((label, _), (_, text))| (label.to_string(), text))
            .collect();

        let judge_prompt = match self.prompt.render(
            &point.prompt,
            &point.data.to_prompt_string(),
            &labeled,
        ) {
            Ok(p) => p,
            Err(e) => {
                let message = format!("cannot build reasoning prompt: {}", e);
                scores.issues.push(ScoreIssue::BackendCall {
                    message: message.clone(),
                });
                return (scores, CallResult::Failed(message));
            }
        };

        tracing::debug!(
            data_point = index,
            outputs = labels.len(),
            prompt_len = judge_prompt.len(),
            "Requesting scores from reasoning model"
        );

        let response = match self.backend.generate(&judge_prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(data_point = index, error = %e, "Reasoning call failed");
                let message = e.to_string();
                scores.issues.push(ScoreIssue::BackendCall {
                    message: message.clone(),
                });
                return (scores, CallResult::Failed(message));
            }
        };

        let entries = match parse_reasoning_response(&response) {
            Ok(entries) => entries,
            Err(message) => {
                tracing::warn!(data_point = index, error = %message, "Unparseable reasoning response");
                scores.issues.push(ScoreIssue::UnparseableResponse { message });
                return (scores, CallResult::Succeeded);
            }
        };

        for (label, backend_id) in labels.iter() {
            let Some(entry) = entries.get(label) else {
                tracing::warn!(data_point = index, label, "Label missing from reasoning response");
                scores.issues.push(ScoreIssue::MissingLabel {
                    model_id: backend_id.to_string(),
                });
                continue;
            };

            match parse_entry(entry) {
                Ok((ScoreInput::Skip, _)) => {
                    tracing::debug!(data_point = index, label, "Reasoning model skipped output");
                }
                Ok((ScoreInput::Scored(score), justification)) => {
                    let record = match justification {
                        Some(j) => ScoreRecord::with_justification(score, j),
                        None => ScoreRecord::new(score),
                    };
                    scores.scores.insert(backend_id.to_string(), record);
                }
                Err(message) => {
                    tracing::warn!(data_point = index, label, error = %message, "Invalid score entry");
                    scores.issues.push(ScoreIssue::InvalidScore {
                        model_id: backend_id.to_string(),
                        message,
                    });
                }
            }
        }

        (scores, CallResult::Succeeded)
    }
}

impl std::fmt::Debug for ReasoningEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningEvaluator")
            .field("backend", &self.backend.id())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Evaluator for ReasoningEvaluator {
    fn method(&self) -> EvalMethod {
        EvalMethod::Reasoning
    }

    fn judge_id(&self) -> Option<&str> {
        Some(self.backend.id())
    }

    async fn evaluate(&mut self, outputs: &[DataPointOutputs]) -> EvaluationOutcome {
        tracing::info!(
            backend = self.backend.id(),
            data_points = outputs.len(),
            concurrency = self.concurrency,
            "Starting reasoning evaluation"
        );

        let this = &*self;
        let jobs: Vec<_> = outputs.iter().map(|point| this.score_point(point)).collect();
        let mut results: Vec<(DataPointScores, CallResult)> = stream::iter(jobs)
            .buffer_unordered(this.concurrency)
            .collect()
            .await;
        results.sort_by_key(|(scores, _)| scores.data_point_index);

        let mut attempts = 0;
        let mut failures = 0;
        let mut last_error = None;
        for (_, call) in &results {
            match call {
                CallResult::NotAttempted => {}
                CallResult::Succeeded => attempts += 1,
                CallResult::Failed(message) => {
                    attempts += 1;
                    failures += 1;
                    last_error = Some(message.clone());
                }
            }
        }

        let scores: Vec<DataPointScores> = results.into_iter().map(|(s, _)| s).collect();
        tracing::info!(attempts, failures, "Reasoning evaluation complete");

        match last_error {
            Some(last_error) if failures == attempts => EvaluationOutcome::failed(
                scores,
                EvaluationError::ReasoningUnavailable {
                    backend: this.backend.id().to_string(),
                    attempts,
                    last_error,
                },
            ),
            _ => EvaluationOutcome::completed(scores),
        }
    }
}
