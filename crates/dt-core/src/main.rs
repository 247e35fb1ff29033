//! dt-core: post-execution analysis for one detonation task.
//!
//! stdout carries JSON payloads; logs go to stderr.

use clap::{Args, Parser, Subcommand};
use dt_common::{ResultAggregate, Task, TaskId, CATEGORY_FILE};
use dt_core::builtin;
use dt_core::config::{resolve_config_dir, StageConfigs};
use dt_core::exit_codes::ExitCode;
use dt_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel, Stage};
use dt_core::plugin::{install_global, PluginRegistry};
use dt_core::signatures::{malscore, resolve_family, TokenConsensus};
use dt_core::AnalysisRunner;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Detonation analysis core
#[derive(Parser)]
#[command(name = "dt-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Log verbosity (trace, debug, info, warn, error, off)
    #[arg(long, global = true, env = "DT_LOG")]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true, env = "DT_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Directory holding <group>.toml and signature_overlay.json
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered plugins by group
    Plugins,

    /// Recompute malscore and malfamily from a results file
    Score(ScoreArgs),

    /// Run processing, signatures and reporting for a stored task
    Process(ProcessArgs),
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Path to a results JSON document
    results: PathBuf,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Storage root containing storage/analyses/<task id>/
    #[arg(long)]
    root: PathBuf,

    /// Task identifier
    #[arg(long)]
    task_id: u64,

    /// Task category when the results file does not carry one
    #[arg(long, default_value = CATEGORY_FILE)]
    category: String,
}

fn main() {
    let cli = Cli::parse();

    init_logging(&LogConfig::from_env(
        cli.global.log_level,
        cli.global.log_format,
    ));
    let run_id = generate_run_id();
    info!(stage = %Stage::Init, run_id = %run_id, "dt-core starting");

    let registry = match install_global(builtin::registry()) {
        Ok(registry) => registry,
        Err(_) => {
            error!(stage = %Stage::Init, "plugin registry installed twice");
            std::process::exit(ExitCode::InternalError.as_i32());
        }
    };

    let exit_code = match cli.command {
        Commands::Plugins => run_plugins(registry),
        Commands::Score(args) => run_score(&args),
        Commands::Process(args) => run_process(&cli.global, registry, &args),
    };

    std::process::exit(exit_code.as_i32());
}

fn print_json(value: &impl Serialize) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            ExitCode::Clean
        }
        Err(e) => {
            error!(error = %e, "failed to serialize output");
            ExitCode::InternalError
        }
    }
}

fn load_results(path: &Path) -> Result<ResultAggregate, ExitCode> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "cannot read results");
        ExitCode::IoError
    })?;
    serde_json::from_str(&content).map_err(|e| {
        error!(path = %path.display(), error = %e, "results file is not a valid aggregate");
        ExitCode::InputError
    })
}

fn run_plugins(registry: &PluginRegistry) -> ExitCode {
    print_json(&registry.summary())
}

fn run_score(args: &ScoreArgs) -> ExitCode {
    let mut results = match load_results(&args.results) {
        Ok(results) => results,
        Err(code) => return code,
    };
    results.signatures.sort_by_key(|m| m.severity);
    let score = malscore(&results.signatures);
    let family = resolve_family(&results, &TokenConsensus);
    print_json(&json!({"malscore": score, "malfamily": family}))
}

fn run_process(global: &GlobalOpts, registry: &PluginRegistry, args: &ProcessArgs) -> ExitCode {
    let paths = resolve_config_dir(global.config_dir.as_deref());
    let configs = match StageConfigs::load(&paths) {
        Ok(configs) => configs,
        Err(e) => {
            error!(stage = %Stage::Init, error = %e, "invalid configuration");
            return ExitCode::ArgsError;
        }
    };

    let runner = AnalysisRunner::new(registry, &configs, &args.root);
    let task_id = TaskId(args.task_id);
    let analysis_path = runner.root().join("storage/analyses").join(task_id.to_string());
    let mut results = match load_results(&analysis_path.join("results.json")) {
        Ok(results) => results,
        Err(code) => return code,
    };

    if results.target.category.is_empty() {
        results.target.category = args.category.clone();
    }
    if results.info.category.is_empty() {
        results.info.category = results.target.category.clone();
    }
    if results.info.id == 0 {
        results.info.id = args.task_id;
    }

    let target = results
        .target
        .file
        .as_ref()
        .map(|f| f.path.clone())
        .or_else(|| results.target.url.clone())
        .unwrap_or_default();
    let task = Task::new(task_id, target, results.target.category.clone());

    let summary = runner.process(&task, &mut results);
    print_json(&summary)
}
