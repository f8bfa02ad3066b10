//! # modelmatch-runtime
//!
//! Everything in a comparison run that talks to a model backend.
//!
//! `modelmatch-core` decides *what* a run is (inputs, catalog, scores,
//! leaderboard). This crate carries it out:
//! - [`providers`]: HTTP clients for the supported model APIs
//! - [`backend`]: the one-prompt-in, one-text-out capability, with retries
//! - [`dispatch`]: bounded fan-out of every (data point, backend) call
//! - [`evaluation`]: human and reasoning-model scoring
//! - [`runner`]: the end-to-end run
//!
//! ## Example
//!
//! ```rust,ignore
//! use modelmatch_runtime::{build_backends, ComparisonRunner, HumanEvaluator};
//! use modelmatch_runtime::providers::{Credentials, ProviderRegistry};
//!
//! let backends = build_backends(&selected, &ProviderRegistry::with_defaults(), &Credentials::from_env())?;
//! let mut runner = ComparisonRunner::builder(params)
//!     .backends(backends)
//!     .evaluator(Box::new(HumanEvaluator::new(channel, None)))
//!     .build()?;
//! let result = runner.run(&input).await?;
//! ```

pub mod backend;
pub mod dispatch;
pub mod evaluation;
pub mod prompts;
pub mod providers;
pub mod runner;

pub use backend::{Backend, ProviderBackend};
pub use dispatch::{default_concurrency, DispatchEngine};
pub use evaluation::{
    EvaluationError, EvaluationOutcome, Evaluator, HumanEvaluator, ReasoningEvaluator,
    ScoreChannel,
};
pub use prompts::{ReasoningPrompt, DEFAULT_REASONING_PROMPT};
pub use providers::{LlmProvider, ProviderError};
pub use runner::{build_backends, ComparisonRunner, ComparisonRunnerBuilder, RunError};
