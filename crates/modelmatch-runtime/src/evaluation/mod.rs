//! Scoring protocols run over the collected raw outputs.
//!
//! Exactly one evaluator is selected per run. Both follow the same rules:
//! - Only successful outputs are scored; a failed call never gets a score
//! - Backend identity is hidden from whoever scores
//! - A score of 0 means "skip" and produces no score record
//! - Problems with a single entry are recorded and scoring moves on

use async_trait::async_trait;
use thiserror::Error;

use modelmatch_core::{DataPointOutputs, DataPointScores, EvalMethod};

mod human;
mod reasoning;

pub use human::{HumanEvaluator, ScoreChannel};
pub use reasoning::{parse_reasoning_response, AnonymizationMap, ReasoningEvaluator};

/// Failures of the evaluation phase as a whole.
///
/// These never abort a run: they are reported in the result next to the raw
/// outputs.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Score input closed before data point {data_point} was scored")]
    InputClosed { data_point: usize },

    #[error("Failed to read score input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reasoning model '{backend}' failed for all {attempts} data points; last error: {last_error}")]
    ReasoningUnavailable {
        backend: String,
        attempts: usize,
        last_error: String,
    },

    #[error("No data point produced a valid score")]
    NoValidScores,
}

/// Scores gathered by an evaluator, plus the phase error if one occurred.
///
/// Scores collected before an error are kept.
#[derive(Debug, Default)]
pub struct EvaluationOutcome {
    pub scores: Vec<DataPointScores>,
    pub error: Option<EvaluationError>,
}

impl EvaluationOutcome {
    pub fn completed(scores: Vec<DataPointScores>) -> Self {
        Self {
            scores,
            error: None,
        }
    }

    pub fn failed(scores: Vec<DataPointScores>, error: EvaluationError) -> Self {
        Self {
            scores,
            error: Some(error),
        }
    }

    /// Number of score records across all data points.
    pub fn score_count(&self) -> usize {
        self.scores.iter().map(|p| p.scores.len()).sum()
    }
}

/// A scoring protocol.
#[async_trait]
pub trait Evaluator: Send {
    fn method(&self) -> EvalMethod;

    /// Id of the backend doing the scoring, when a model scores.
    fn judge_id(&self) -> Option<&str> {
        None
    }

    /// Score the outputs of every data point.
    ///
    /// The returned scores are keyed by backend id, never by the labels
    /// shown during scoring.
    async fn evaluate(&mut self, outputs: &[DataPointOutputs]) -> EvaluationOutcome;
}
