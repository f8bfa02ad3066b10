//! Blind scoring by a person.
//!
//! Per data point: show the data and prompt, then every successful output
//! in a freshly shuffled order, labeled only by position. Each output takes
//! an integer 0-10; anything else is re-asked.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io;

use modelmatch_core::{
    DataPointOutputs, DataPointScores, EvalMethod, ScoreInput, ScoreRecord,
};

use super::{EvaluationError, EvaluationOutcome, Evaluator};

/// The interactive boundary between the evaluator and a person.
pub trait ScoreChannel: Send {
    /// Show a block of text.
    fn show(&mut self, text: &str) -> io::Result<()>;

    /// Ask for one line of input; `None` once input is closed.
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Evaluator that asks a person for every score.
///
/// Channel reads block, so each evaluation runs on tokio's blocking pool.
pub struct HumanEvaluator {
    session: Option<Session>,
}

/// The channel and shuffle state, moved onto the blocking pool per run.
struct Session {
    channel: Box<dyn ScoreChannel>,
    rng: StdRng,
}

impl HumanEvaluator {
    /// Create an evaluator; `seed` makes the presentation order reproducible.
    pub fn new(channel: Box<dyn ScoreChannel>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            session: Some(Session { channel, rng }),
        }
    }
}

impl Session {
    /// Ask until a valid entry arrives.
    fn read_score(&mut self, data_point: usize, label: &str) -> Result<ScoreInput, EvaluationError> {
        let prompt = format!("Score for {} (1-10, 0 to skip): ", label);
        loop {
            let Some(line) = self.channel.ask(&prompt)? else {
                return Err(EvaluationError::InputClosed { data_point });
            };
            match line.parse::<ScoreInput>() {
                Ok(input) => return Ok(input),
                Err(e) => {
                    self.channel
                        .show(&format!("Invalid score: {}. Enter a whole number from 0 to 10.", e))?;
                }
            }
        }
    }

    fn score_point(
        &mut self,
        point: &DataPointOutputs,
        total: usize,
    ) -> Result<DataPointScores, EvaluationError> {
        let index = point.data_point_index;
        let mut scores = DataPointScores::new(index, point.data.clone());

        let mut shown: Vec<(&str, &str)> = point.successful().collect();
        if shown.is_empty() {
            tracing::warn!(data_point = index, "No successful outputs to score");
            self.channel.show(&format!(
                "\n=== Data point {}/{} ===\nEvery model failed on this data point; skipping.",
                index + 1,
                total
            ))?;
            return Ok(scores);
        }

        shown.shuffle(&mut self.rng);

        self.channel.show(&format!(
            "\n=== Data point {}/{} ===\nData:\n{}\n\nPrompt used:\n{}",
            index + 1,
            total,
            point.data.to_prompt_string(),
            point.prompt
        ))?;

        let count = shown.len();
        for (position, (backend_id, text)) in shown.into_iter().enumerate() {
            let label = format!("Output {}/{}", position + 1, count);
            self.channel
                .show(&format!("\n--- {} ---\n{}\n---", label, text))?;

            match self.read_score(index, &label)? {
                ScoreInput::Skip => {
                    tracing::debug!(data_point = index, "Output skipped");
                }
                ScoreInput::Scored(score) => {
                    scores
                        .scores
                        .insert(backend_id.to_string(), ScoreRecord::new(score));
                }
            }
        }

        Ok(scores)
    }

    fn run(&mut self, outputs: &[DataPointOutputs]) -> EvaluationOutcome {
        let total = outputs.len();
        let mut all = Vec::with_capacity(total);

        for point in outputs {
            match self.score_point(point, total) {
                Ok(scores) => all.push(scores),
                Err(e) => {
                    tracing::warn!(data_point = point.data_point_index, error = %e, "Human evaluation stopped");
                    return EvaluationOutcome::failed(all, e);
                }
            }
        }

        EvaluationOutcome::completed(all)
    }
}

impl std::fmt::Debug for HumanEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanEvaluator")
            .field("ready", &self.session.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Evaluator for HumanEvaluator {
    fn method(&self) -> EvalMethod {
        EvalMethod::Human
    }

    async fn evaluate(&mut self, outputs: &[DataPointOutputs]) -> EvaluationOutcome {
        tracing::info!(data_points = outputs.len(), "Starting human evaluation");

        let Some(mut session) = self.session.take() else {
            return EvaluationOutcome::failed(
                Vec::new(),
                EvaluationError::Io(io::Error::other("score channel was lost by an earlier run")),
            );
        };
        let owned = outputs.to_vec();

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = session.run(&owned);
            (session, outcome)
        })
        .await;

        match joined {
            Ok((session, outcome)) => {
                self.session = Some(session);
                tracing::info!(scores = outcome.score_count(), "Human evaluation complete");
                outcome
            }
            Err(e) => EvaluationOutcome::failed(
                Vec::new(),
                EvaluationError::Io(io::Error::other(format!("score entry task failed: {}", e))),
            ),
        }
    }
}

/// In-memory channel fed from a script of answers.
#[cfg(test)]
pub(crate) struct ScriptedChannel {
    answers: std::collections::VecDeque<String>,
    pub shown: std::sync::Arc<std::sync::Mutex<Vec<String>>>,
}

#[cfg(test)]
impl ScriptedChannel {
    pub(crate) fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            shown: Default::default(),
        }
    }
}

#[cfg(test)]
impl ScoreChannel for ScriptedChannel {
    fn show(&mut self, text: &str) -> io::Result<()> {
        self.shown.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn ask(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.answers.pop_front())
    }
}
