//! Result assembly: the single structure handed to rendering and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::aggregator::Leaderboard;
use crate::types::{DataPointOutputs, DataPointScores, EvalMethod, RunParameters};

/// Parameters of a finished run, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    pub prompt_template: String,
    pub models_compared: Vec<String>,
    pub evaluation_method: EvalMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_model_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_workers: Option<usize>,

    pub num_data_points: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Scores, leaderboard and any evaluation-phase error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    /// Backend id to rounded average; `null` for backends without scores
    pub average_scores: BTreeMap<String, Option<f64>>,
    pub leaderboard: Leaderboard,
    pub detailed_scores: Vec<DataPointScores>,
    pub error: Option<String>,
}

impl EvaluationSummary {
    pub fn new(
        leaderboard: Leaderboard,
        detailed_scores: Vec<DataPointScores>,
        error: Option<String>,
    ) -> Self {
        Self {
            average_scores: leaderboard.average_scores(),
            leaderboard,
            detailed_scores,
            error,
        }
    }

    /// True when any data point carries scores or issues worth showing.
    pub fn has_details(&self) -> bool {
        self.detailed_scores
            .iter()
            .any(|p| !p.scores.is_empty() || !p.issues.is_empty())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub parameters: RunSummary,
    pub raw_outputs_per_data_point: Vec<DataPointOutputs>,
    pub evaluation: EvaluationSummary,
}

impl ComparisonResult {
    /// Serialize as pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Count of failure records in the raw output matrix.
    pub fn failed_calls(&self) -> usize {
        self.raw_outputs_per_data_point
            .iter()
            .flat_map(|p| p.outputs.values())
            .filter(|r| !r.is_success())
            .count()
    }
}

/// Builds a [`ComparisonResult`] without side effects.
#[derive(Debug, Clone)]
pub struct ResultAssembler {
    started_at: DateTime<Utc>,
}

impl ResultAssembler {
    /// Start assembling; the run's start time is taken now.
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self { started_at }
    }

    pub fn assemble(
        &self,
        params: &RunParameters,
        prompt_template: &str,
        mut outputs: Vec<DataPointOutputs>,
        evaluation: EvaluationSummary,
    ) -> ComparisonResult {
        outputs.sort_by_key(|p| p.data_point_index);

        ComparisonResult {
            parameters: RunSummary {
                input_file: params.input_file.clone(),
                output_file: params.output_file.clone(),
                prompt_template: prompt_template.to_string(),
                models_compared: params.backends.clone(),
                evaluation_method: params.method,
                reasoning_model_id: params.reasoning_backend.clone(),
                max_workers: params.concurrency,
                num_data_points: outputs.len(),
                started_at: self.started_at,
                completed_at: Utc::now(),
            },
            raw_outputs_per_data_point: outputs,
            evaluation,
        }
    }
}

impl Default for ResultAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::types::{DataPoint, OutputRecord, Score, ScoreRecord};

    fn params() -> RunParameters {
        RunParameters {
            input_file: PathBuf::from("input.json"),
            backends: vec!["m1".to_string(), "m2".to_string()],
            method: EvalMethod::Reasoning,
            reasoning_backend: Some("judge".to_string()),
            concurrency: Some(4),
            output_file: PathBuf::from("out.json"),
        }
    }

    fn outputs(index: usize) -> DataPointOutputs {
        let mut records = BTreeMap::new();
        records.insert("m1".to_string(), OutputRecord::success("OK"));
        records.insert("m2".to_string(), OutputRecord::failure("timeout"));
        DataPointOutputs {
            data_point_index: index,
            data: DataPoint::from("x"),
            prompt: "say x".to_string(),
            outputs: records,
        }
    }

    fn evaluation() -> EvaluationSummary {
        let mut point = DataPointScores::new(0, DataPoint::from("x"));
        point.scores.insert(
            "m1".to_string(),
            ScoreRecord::with_justification(Score::new(9).unwrap(), "concise"),
        );
        let backends = params().backends;
        let board = Aggregator::new().aggregate(&backends, std::slice::from_ref(&point));
        EvaluationSummary::new(board, vec![point], None)
    }

    #[test]
    fn test_assemble_orders_outputs_by_index() {
        let result = ResultAssembler::new().assemble(
            &params(),
            "say {data}",
            vec![outputs(1), outputs(0)],
            evaluation(),
        );
        assert_eq!(result.raw_outputs_per_data_point[0].data_point_index, 0);
        assert_eq!(result.parameters.num_data_points, 2);
        assert_eq!(result.failed_calls(), 2);
        assert!(result.parameters.completed_at >= result.parameters.started_at);
    }

    #[test]
    fn test_result_json_shape() {
        let result =
            ResultAssembler::new().assemble(&params(), "say {data}", vec![outputs(0)], evaluation());
        let json: serde_json::Value =
            serde_json::from_str(&result.to_json_pretty().unwrap()).unwrap();

        assert_eq!(json["parameters"]["evaluation_method"], "reasoning");
        assert_eq!(json["parameters"]["reasoning_model_id"], "judge");
        assert_eq!(
            json["raw_outputs_per_data_point"][0]["outputs"]["m2"]["error"],
            "ERROR: timeout"
        );
        assert_eq!(json["evaluation"]["average_scores"]["m1"], 9.0);
        assert_eq!(json["evaluation"]["average_scores"]["m2"], serde_json::Value::Null);
        assert_eq!(
            json["evaluation"]["detailed_scores"][0]["scores"]["m1"]["justification"],
            "concise"
        );
        assert_eq!(json["evaluation"]["error"], serde_json::Value::Null);
    }

    #[test]
    fn test_result_round_trips() {
        let result =
            ResultAssembler::new().assemble(&params(), "say {data}", vec![outputs(0)], evaluation());
        let back: ComparisonResult =
            serde_json::from_str(&result.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_has_details() {
        assert!(evaluation().has_details());
        let empty = EvaluationSummary::new(Leaderboard::default(), vec![], Some("x".into()));
        assert!(!empty.has_details());
    }
}
