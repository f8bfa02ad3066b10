//! Comparison runner: one full run from input data to result structure.
//!
//! A run moves through four phases, each finished before the next starts:
//! 1. Validate parameters and render every prompt (fatal on error, no cost)
//! 2. Dispatch every (data point, backend) call under the concurrency bound
//! 3. Evaluate the successful outputs with the selected evaluator
//! 4. Aggregate scores into a leaderboard and assemble the result
//!
//! Only phase 1 can fail the run. Backend and evaluation problems end up
//! inside the returned [`ComparisonResult`].

use std::sync::Arc;
use thiserror::Error;

use modelmatch_core::{
    Aggregator, ComparisonResult, ConfigError, EvaluationSummary, InputData, ModelEntry,
    ResultAssembler, RunParameters,
};

use crate::backend::{Backend, ProviderBackend};
use crate::dispatch::{default_concurrency, DispatchEngine};
use crate::evaluation::{EvaluationError, Evaluator};
use crate::providers::{Credentials, ProviderError, ProviderRegistry};

/// Errors that stop a run before any backend is called.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot set up model '{model_id}': {source}")]
    Backend {
        model_id: String,
        #[source]
        source: ProviderError,
    },
}

/// Build one backend per catalog entry.
pub fn build_backends(
    entries: &[&ModelEntry],
    registry: &ProviderRegistry,
    credentials: &Credentials,
) -> Result<Vec<Arc<dyn Backend>>, RunError> {
    entries
        .iter()
        .map(|entry| {
            ProviderBackend::from_entry(entry, registry, credentials)
                .map(|b| Arc::new(b) as Arc<dyn Backend>)
                .map_err(|source| RunError::Backend {
                    model_id: entry.model_id.clone(),
                    source,
                })
        })
        .collect()
}

/// Runs a comparison with a fixed set of backends and one evaluator.
pub struct ComparisonRunner {
    params: RunParameters,
    backends: Vec<Arc<dyn Backend>>,
    evaluator: Box<dyn Evaluator>,
    engine: DispatchEngine,
}

impl ComparisonRunner {
    pub fn builder(params: RunParameters) -> ComparisonRunnerBuilder {
        ComparisonRunnerBuilder {
            params,
            backends: Vec::new(),
            evaluator: None,
        }
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Concurrency bound actually used for dispatch.
    pub fn concurrency(&self) -> usize {
        self.engine.concurrency()
    }

    /// Execute the run.
    ///
    /// # Errors
    /// Returns [`RunError`] only for configuration problems, which are always
    /// detected before the first backend call.
    pub async fn run(&mut self, input: &InputData) -> Result<ComparisonResult, RunError> {
        let assembler = ResultAssembler::new();

        tracing::info!(
            models = ?self.params.backends,
            method = %self.params.method,
            data_points = input.data.len(),
            "Starting comparison run"
        );

        let outputs = self.engine.dispatch(input, &self.backends).await?;

        let outcome = self.evaluator.evaluate(&outputs).await;
        let mut error = outcome.error;
        if error.is_none() && outcome.scores.iter().all(|p| p.scores.is_empty()) {
            error = Some(EvaluationError::NoValidScores);
        }
        if let Some(e) = &error {
            tracing::warn!(error = %e, "Evaluation finished with an error");
        }

        let leaderboard = Aggregator::new().aggregate(&self.params.backends, &outcome.scores);
        let evaluation = EvaluationSummary::new(
            leaderboard,
            outcome.scores,
            error.map(|e| e.to_string()),
        );

        let mut params = self.params.clone();
        params.concurrency = Some(self.engine.concurrency());
        let result = assembler.assemble(&params, &input.prompt_template, outputs, evaluation);

        tracing::info!(
            data_points = result.parameters.num_data_points,
            failed_calls = result.failed_calls(),
            scored = result.evaluation.leaderboard.total_scored(),
            "Comparison run complete"
        );
        Ok(result)
    }
}

impl std::fmt::Debug for ComparisonRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparisonRunner")
            .field("params", &self.params)
            .field("method", &self.evaluator.method())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ComparisonRunner`].
pub struct ComparisonRunnerBuilder {
    params: RunParameters,
    backends: Vec<Arc<dyn Backend>>,
    evaluator: Option<Box<dyn Evaluator>>,
}

impl ComparisonRunnerBuilder {
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backends(mut self, backends: impl IntoIterator<Item = Arc<dyn Backend>>) -> Self {
        self.backends.extend(backends);
        self
    }

    pub fn evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Check the configuration and build the runner.
    pub fn build(self) -> Result<ComparisonRunner, RunError> {
        self.params.validate()?;

        let ids: Vec<&str> = self.backends.iter().map(|b| b.id()).collect();
        if ids != self.params.backends {
            return Err(ConfigError::InvalidInput(format!(
                "backends [{}] do not match the selected models [{}]",
                ids.join(", "),
                self.params.backends.join(", ")
            ))
            .into());
        }

        let evaluator = self.evaluator.ok_or_else(|| {
            ConfigError::InvalidInput("no evaluator configured".to_string())
        })?;
        if evaluator.method() != self.params.method {
            return Err(ConfigError::InvalidInput(format!(
                "evaluator uses the '{}' method but the run asks for '{}'",
                evaluator.method(),
                self.params.method
            ))
            .into());
        }
        if evaluator.judge_id() != self.params.reasoning_backend.as_deref() {
            return Err(ConfigError::InvalidInput(format!(
                "evaluator scores with '{}' but the run names '{}' as reasoning model",
                evaluator.judge_id().unwrap_or("nobody"),
                self.params.reasoning_backend.as_deref().unwrap_or("none")
            ))
            .into());
        }

        let engine = DispatchEngine::new(self.params.concurrency.unwrap_or_else(default_concurrency));

        Ok(ComparisonRunner {
            params: self.params,
            backends: self.backends,
            evaluator,
            engine,
        })
    }
}
