//! cantor - compose, review and adjust song lyrics from legal source texts
//!
//! Runs the multi-cycle compose/review workflow against configured model
//! providers, checkpointing after every stage so an interrupted run can be
//! resumed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cantor_core::{ExecutionState, ParsedDocument, RunSpec, Stage};
use cantor_runtime::{
    ClientFactoryRegistry, FileCheckpointStore, RuntimeConfig, WorkflowEngine,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Provider ids picked up from the environment when the runtime config
/// lists none.
const ENV_PROVIDERS: [(&str, &str); 4] = [
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("openai", "OPENAI_API_KEY"),
    ("deepseek", "DEEPSEEK_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
];

/// cantor - multi-cycle lyric composition with legal and linguistic review
#[derive(Parser, Debug)]
#[command(name = "cantor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a run spec and show which provider serves each stage
    Validate {
        /// Run spec file (YAML or JSON)
        spec: PathBuf,

        /// Runtime config file (YAML); supplies the default provider
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Start a new run
    Run {
        /// Run spec file (YAML or JSON)
        #[arg(short, long)]
        spec: PathBuf,

        /// Parsed document file with theme, topic and body (YAML or JSON)
        #[arg(short, long)]
        document: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Run id used for checkpoints (generated when omitted)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Continue an interrupted run from its last checkpoint
    Resume {
        /// Run id of the interrupted run
        #[arg(long)]
        run_id: String,

        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Runtime config file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for run checkpoints
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// Write the final state here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Validate { spec, config } => validate(&spec, config.as_deref()),
        Commands::Run {
            spec,
            document,
            common,
            run_id,
        } => {
            let spec = RunSpec::from_file(&spec)
                .with_context(|| format!("Failed to load run spec {}", spec.display()))?;
            let document = load_document(&document)?;
            let run_id = run_id.unwrap_or_else(|| format!("run-{}", uuid::Uuid::new_v4()));

            let engine = build_engine(&common)?;
            let initial = ExecutionState::initial(document, spec.style, spec.cycles);

            tracing::info!(run_id = %run_id, "Starting run");
            let state = interruptible(&run_id, engine.run(&run_id, initial)).await?;
            finish(&engine, &run_id, &state, common.output.as_deref())
        }
        Commands::Resume { run_id, common } => {
            let engine = build_engine(&common)?;
            let state = interruptible(&run_id, engine.resume(&run_id)).await?;
            finish(&engine, &run_id, &state, common.output.as_deref())
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn validate(path: &Path, config: Option<&Path>) -> Result<()> {
    let spec = RunSpec::from_file(path)
        .with_context(|| format!("Invalid run spec {}", path.display()))?;
    let registry = load_config(config)?.registry();

    println!("Style: {}", spec.style);
    println!("Cycles: {}", spec.cycles.total_cycles());
    for cycle in 1..=spec.cycles.total_cycles() {
        println!("\nCycle {}", cycle);
        for stage in [
            Stage::Compose,
            Stage::LegalReview,
            Stage::LegalAdjust,
            Stage::LinguisticReview,
            Stage::LinguisticAdjust,
        ] {
            if let Some(models) = spec.cycles.stage_models(cycle, stage) {
                println!(
                    "  {:<18} {} ({}) -> {} ({})",
                    stage.as_str(),
                    models.primary,
                    registry.resolve(&models.primary),
                    models.fallback,
                    registry.resolve(&models.fallback)
                );
            }
        }
    }
    println!("\nRun spec is valid");
    Ok(())
}

fn load_document(path: &Path) -> Result<ParsedDocument> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;
    let document: ParsedDocument = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse document {}", path.display()))?;

    if document.body.trim().is_empty() {
        bail!("Document {} has an empty body", path.display());
    }
    for warning in &document.warnings {
        tracing::warn!(document = %path.display(), warning = %warning, "Document parser warning");
    }
    Ok(document)
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path)
            .with_context(|| format!("Failed to load runtime config {}", path.display())),
        None => Ok(RuntimeConfig::default()),
    }
}

fn build_engine(args: &CommonArgs) -> Result<WorkflowEngine> {
    let mut config = load_config(args.config.as_deref())?;

    if config.providers.is_empty() {
        config.providers = providers_from_env();
    }
    if config.providers.is_empty() {
        bail!(
            "No model providers configured. Add a `providers` section to the runtime config \
             or set one of: {}",
            ENV_PROVIDERS
                .iter()
                .map(|(_, env)| *env)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let router = config
        .client_router(&ClientFactoryRegistry::with_defaults())
        .context("Failed to configure model providers")?;
    tracing::info!(providers = ?router.providers(), "Model providers configured");

    let engine = WorkflowEngine::builder()
        .client(Arc::new(router))
        .checkpoints(Arc::new(FileCheckpointStore::new(&args.checkpoint_dir)))
        .config(config)
        .build()?;
    Ok(engine)
}

fn providers_from_env() -> BTreeMap<String, serde_json::Value> {
    ENV_PROVIDERS
        .iter()
        .filter(|(_, env)| std::env::var(env).is_ok_and(|v| !v.trim().is_empty()))
        .map(|(provider, _)| (provider.to_string(), json!({})))
        .collect()
}

/// Await a run, stopping early on Ctrl-C.
///
/// In-flight model calls finish on their own tasks; the last checkpoint
/// stays valid for `cantor resume`.
async fn interruptible<F, E>(run_id: &str, run: F) -> Result<ExecutionState>
where
    F: std::future::Future<Output = std::result::Result<ExecutionState, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::select! {
        result = run => Ok(result?),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(run_id, "Interrupted, resume with `cantor resume --run-id {}`", run_id);
            bail!("Run {} interrupted", run_id)
        }
    }
}

fn finish(
    engine: &WorkflowEngine,
    run_id: &str,
    state: &ExecutionState,
    output: Option<&Path>,
) -> Result<()> {
    let summary = state.usage_summary();
    tracing::info!(
        run_id,
        usage = %serde_json::to_string(&summary)?,
        "Model usage"
    );
    for (provider, stats) in engine.throttler().stats() {
        if stats.total_calls > 0 {
            tracing::info!(provider = %provider, stats = %serde_json::to_string(&stats)?, "Throttle stats");
        }
    }
    if state.is_degraded() {
        tracing::warn!(
            run_id,
            legal_status = %state.legal_status,
            linguistic_status = %state.linguistic_status,
            "Run finished with failed stages"
        );
    }

    let json = serde_json::to_string_pretty(state)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(run_id, path = %path.display(), "Final state written");
        }
        None => println!("{}", json),
    }
    Ok(())
}
