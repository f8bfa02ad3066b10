//! ModelMatch CLI
//!
//! Runs one prompt template against two or three models for every data point
//! of an input file, scores the outputs by hand or with a reasoning model, and
//! prints a leaderboard.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use modelmatch_core::{EvalMethod, InputData, ModelCatalog, ModelEntry, RunParameters};
use modelmatch_runtime::providers::{Credentials, ProviderRegistry};
use modelmatch_runtime::{
    build_backends, ComparisonRunner, Evaluator, HumanEvaluator, ReasoningEvaluator,
    ReasoningPrompt,
};

mod render;
mod terminal;

use terminal::TerminalChannel;

/// Scoring protocol
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum CliEvalMethod {
    /// Score every output yourself, blind
    Human,
    /// Let a reasoning model score the outputs
    Reasoning,
}

impl From<CliEvalMethod> for EvalMethod {
    fn from(m: CliEvalMethod) -> Self {
        match m {
            CliEvalMethod::Human => EvalMethod::Human,
            CliEvalMethod::Reasoning => EvalMethod::Reasoning,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "modelmatch")]
#[command(version, about = "Compare LLM outputs on the same prompt and rank them")]
struct Cli {
    /// Input JSON file with `prompt_template` and `data`
    #[arg(short, long, required_unless_present = "list_models")]
    input_file: Option<PathBuf>,

    /// Models to compare, by model id or display name (2 or 3)
    #[arg(short, long, value_delimiter = ',', required_unless_present = "list_models")]
    models: Vec<String>,

    /// Evaluation method
    #[arg(short, long, alias = "eval-method", value_enum, required_unless_present = "list_models")]
    evaluation_method: Option<CliEvalMethod>,

    /// Reasoning model (id or display name), required for reasoning evaluation
    #[arg(short, long)]
    reasoning_model: Option<String>,

    /// Where to write the full results JSON
    #[arg(short, long, default_value = "modelmatch_results.json")]
    output_file: PathBuf,

    /// Default log level; RUST_LOG overrides it
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Maximum concurrent model calls (default: available cores + 4, at most 32)
    #[arg(long)]
    max_workers: Option<usize>,

    /// List configured models and exit
    #[arg(long)]
    list_models: bool,

    /// Print per-data-point scores and justifications
    #[arg(long)]
    show_details: bool,

    /// Model catalog file
    #[arg(long, default_value = "model_config.yaml")]
    models_config: PathBuf,

    /// Custom reasoning prompt template file
    #[arg(long)]
    reasoning_prompt: Option<PathBuf>,

    /// Seed for the order outputs are shown in during human evaluation
    #[arg(long)]
    seed: Option<u64>,
}

fn init_logging(level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the catalog and reject providers this build cannot create.
fn load_catalog(path: &Path, registry: &ProviderRegistry) -> Result<ModelCatalog> {
    let catalog = ModelCatalog::from_yaml_file(path)
        .with_context(|| format!("Cannot load model catalog {}", path.display()))?;

    for entry in catalog.entries() {
        if !registry.has_provider(&entry.provider) {
            bail!(
                "Model '{}' uses unknown provider '{}'. Available: {}",
                entry.model_id,
                entry.provider,
                registry.available_types().join(", ")
            );
        }
    }
    Ok(catalog)
}

fn write_results(path: &Path, json: &str) -> Result<PathBuf> {
    fs::write(path, json).with_context(|| format!("Cannot write results to {}", path.display()))?;
    Ok(fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
}

/// Resolve the model selection into validated run parameters.
///
/// `--reasoning-model` only matters for reasoning evaluation; with any other
/// method it is ignored with a warning.
fn resolve_run<'c>(
    cli: &Cli,
    catalog: &'c ModelCatalog,
) -> Result<(RunParameters, Vec<&'c ModelEntry>, Option<&'c ModelEntry>)> {
    let (Some(input_file), Some(method)) = (&cli.input_file, cli.evaluation_method) else {
        bail!("--input-file, --models and --evaluation-method are required");
    };
    let method = EvalMethod::from(method);

    let selected = catalog.resolve_selection(&cli.models)?;
    let reasoning_entry: Option<&ModelEntry> = match (method, cli.reasoning_model.as_deref()) {
        (EvalMethod::Reasoning, Some(name)) => Some(catalog.resolve(name)?),
        (EvalMethod::Reasoning, None) => None,
        (_, Some(name)) => {
            tracing::warn!(
                reasoning_model = name,
                method = %method,
                "Reasoning model is only used by reasoning evaluation; ignoring it"
            );
            None
        }
        (_, None) => None,
    };

    let params = RunParameters {
        input_file: input_file.clone(),
        backends: selected.iter().map(|e| e.model_id.clone()).collect(),
        method,
        reasoning_backend: reasoning_entry.map(|e| e.model_id.clone()),
        concurrency: cli.max_workers,
        output_file: cli.output_file.clone(),
    };
    params.validate()?;

    Ok((params, selected, reasoning_entry))
}

async fn run(cli: Cli) -> Result<()> {
    let registry = ProviderRegistry::with_defaults();
    let catalog = load_catalog(&cli.models_config, &registry)?;

    if cli.list_models {
        if catalog.is_empty() {
            println!("No models configured in {}", cli.models_config.display());
        } else {
            println!("{}", render::model_list(&catalog));
        }
        return Ok(());
    }

    let (params, selected, reasoning_entry) = resolve_run(&cli, &catalog)?;
    let method = params.method;

    let input = InputData::from_json_file(&params.input_file)?;
    // Surface template problems before any client is built.
    input.render_prompts()?;

    let reasoning_prompt = match &cli.reasoning_prompt {
        Some(path) => ReasoningPrompt::from_file(path)?,
        None => ReasoningPrompt::default(),
    };

    let credentials = Credentials::from_env();
    tracing::debug!(credentials = ?credentials, "Loaded credentials");
    let backends = build_backends(&selected, &registry, &credentials)?;

    let evaluator: Box<dyn Evaluator> = match (method, reasoning_entry) {
        (EvalMethod::Reasoning, Some(entry)) => {
            let judge = build_backends(&[entry], &registry, &credentials)?
                .into_iter()
                .next()
                .context("reasoning backend was not built")?;
            let concurrency = cli
                .max_workers
                .unwrap_or_else(modelmatch_runtime::default_concurrency);
            Box::new(ReasoningEvaluator::new(judge, reasoning_prompt, concurrency))
        }
        _ => Box::new(HumanEvaluator::new(
            Box::new(TerminalChannel::stdio()),
            cli.seed,
        )),
    };

    let mut runner = ComparisonRunner::builder(params)
        .backends(backends)
        .evaluator(evaluator)
        .build()?;

    let result = runner.run(&input).await?;

    println!();
    println!("{}", render::summary(&result));
    println!("{}", render::leaderboard(&result));
    if let Some(error) = &result.evaluation.error {
        println!("Evaluation error: {}", error);
    }
    if cli.show_details {
        print!("{}", render::details(&result));
    } else if result.evaluation.has_details() {
        println!("Run with --show-details to see per-data-point scores.");
    }

    let json = result
        .to_json_pretty()
        .context("Cannot serialize results")?;
    let saved = write_results(&cli.output_file, &json)?;
    println!("\nFull results JSON saved to: {}", saved.display());

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Run aborted");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_full_run() {
        let cli = Cli::try_parse_from([
            "modelmatch",
            "-i",
            "input.json",
            "-m",
            "gpt-4o,Gemini Flash",
            "-e",
            "reasoning",
            "-r",
            "judge",
            "--max-workers",
            "3",
            "--seed",
            "7",
        ])
        .unwrap();

        assert_eq!(cli.models, vec!["gpt-4o", "Gemini Flash"]);
        assert_eq!(cli.evaluation_method, Some(CliEvalMethod::Reasoning));
        assert_eq!(cli.output_file, PathBuf::from("modelmatch_results.json"));
        assert_eq!(cli.max_workers, Some(3));
        assert_eq!(cli.seed, Some(7));
    }

    #[test]
    fn test_list_models_needs_nothing_else() {
        let cli = Cli::try_parse_from(["modelmatch", "--list-models"]).unwrap();
        assert!(cli.list_models);
        assert!(Cli::try_parse_from(["modelmatch", "-i", "input.json"]).is_err());
    }

    fn catalog() -> ModelCatalog {
        ModelCatalog::new(vec![
            ModelEntry::new("a", "Model A", "openai"),
            ModelEntry::new("b", "Model B", "google"),
            ModelEntry::new("j", "Judge", "openai"),
        ])
        .unwrap()
    }

    #[test]
    fn test_reasoning_model_ignored_for_human_method() {
        let cli = Cli::try_parse_from([
            "modelmatch", "-i", "input.json", "-m", "a,b", "-e", "human", "-r", "j",
        ])
        .unwrap();
        let catalog = catalog();

        let (params, selected, judge) = resolve_run(&cli, &catalog).unwrap();
        assert_eq!(params.method, EvalMethod::Human);
        assert_eq!(params.reasoning_backend, None);
        assert!(judge.is_none());
        assert_eq!(selected.len(), 2);

        // Not even resolved, so an unknown name is harmless too.
        let cli = Cli::try_parse_from([
            "modelmatch", "-i", "input.json", "-m", "a,b", "-e", "human", "-r", "nobody",
        ])
        .unwrap();
        assert!(resolve_run(&cli, &catalog).is_ok());
    }

    #[test]
    fn test_reasoning_method_resolves_judge() {
        let cli = Cli::try_parse_from([
            "modelmatch", "-i", "input.json", "-m", "Model A,b", "-e", "reasoning", "-r", "Judge",
        ])
        .unwrap();
        let catalog = catalog();
        let (params, _, judge) = resolve_run(&cli, &catalog).unwrap();
        assert_eq!(params.reasoning_backend.as_deref(), Some("j"));
        assert_eq!(judge.map(|e| e.model_id.as_str()), Some("j"));

        let cli = Cli::try_parse_from(["modelmatch", "-i", "input.json", "-m", "a,b", "-e", "reasoning"])
            .unwrap();
        assert!(resolve_run(&cli, &catalog).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let dir = std::env::temp_dir().join(format!("modelmatch-cli-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("models.yaml");
        fs::write(
            &path,
            "models:\n  - model_id: m1\n    provider: carrier-pigeon\n",
        )
        .unwrap();

        let err = load_catalog(&path, &ProviderRegistry::with_defaults()).unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
