use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use thiserror::Error;

use kira_cytogate::config::{AnalysisConfig, ConfigError};
use kira_cytogate::input::InputError;
use kira_cytogate::logging;
use kira_cytogate::model::HarmonizePolicy;
use kira_cytogate::pipeline::stage1_load::{Stage1Params, run_stage1};
use kira_cytogate::pipeline::stage2_preprocess::{Stage2Error, run_stage2};
use kira_cytogate::pipeline::stage3_gating::run_stage3;
use kira_cytogate::pipeline::stage4_report::{Stage4Input, write_reports};
use kira_cytogate::stats::{self, Aggregator};
use kira_cytogate::tree::TreeError;

#[derive(Debug, Error)]
enum AppError {
    #[error("invalid arguments: {0}")]
    Args(String),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Preprocess(#[from] Stage2Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("failed to write reports: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Parser)]
#[command(name = "kira-cytogate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load, preprocess and gate every sample in a directory, then write
    /// per-population statistics.
    Run(RunArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RunMode {
    Standalone,
    /// Write into `<out>/kira-cytogate` for multi-tool pipelines.
    Pipeline,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Directory of .fcs / .tsv / .csv (optionally .gz) samples.
    #[arg(long)]
    input: PathBuf,
    /// JSON analysis template.
    #[arg(long)]
    template: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Tab-separated per-sample annotations keyed by sample or file name.
    #[arg(long)]
    meta: Option<PathBuf>,
    /// Report only this node (full path or unique name).
    #[arg(long)]
    node: Option<String>,
    /// Per-channel aggregate: mean, median, count or pNN.
    #[arg(long)]
    aggregate: Option<String>,
    /// Channels to aggregate; all channels when omitted.
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,
    /// Worker threads; rayon's default when omitted.
    #[arg(long)]
    threads: Option<usize>,
    /// Fail on any channel-set mismatch instead of excluding samples.
    #[arg(long)]
    strict_channels: bool,
    #[arg(long, value_enum, default_value_t = RunMode::Standalone)]
    run_mode: RunMode,
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    let Command::Run(args) = cli.command;
    logging::init(args.verbose);
    if let Err(err) = run(&args) {
        tracing::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &RunArgs) -> Result<(), AppError> {
    if let Some(n) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .map_err(|e| AppError::Args(format!("--threads {n}: {e}")))?;
    }
    let aggregator = resolve_aggregator(args)?;
    let config = AnalysisConfig::from_path(&args.template)?;
    let out_dir = resolve_output_dir(&args.out, args.run_mode);

    let loaded = run_stage1(&Stage1Params {
        input_dir: args.input.clone(),
        meta_path: args.meta.clone(),
        well_pattern: config.well_regex()?,
    })?;

    let policy = if args.strict_channels {
        HarmonizePolicy::Strict
    } else {
        HarmonizePolicy::ExcludeMismatched
    };
    let pre = run_stage2(&loaded, &config, policy)?;
    if pre.samples.is_empty() {
        return Err(InputError::MissingInput(
            "no samples left after preprocessing".to_string(),
        )
        .into());
    }

    let gs = run_stage3(&pre.samples, config.build_gates()?)?;
    let records = stats::stats(&gs, args.node.as_deref(), aggregator.as_deref())?;

    let input = Stage4Input {
        gating_set: &gs,
        samples: &pre.samples,
        records: &records,
        transforms: &pre.transforms,
        aggregator: aggregator.as_ref().map(|a| a.name().to_string()),
        compensated: pre.compensated,
        renamed_channels: pre.renamed_channels,
        input_dir: args.input.display().to_string(),
        template: args.template.display().to_string(),
        tool_name: env!("CARGO_PKG_NAME").to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: read_git_hash(&PathBuf::from(".")),
    };
    write_reports(&input, &out_dir)?;
    Ok(())
}

fn resolve_aggregator(args: &RunArgs) -> Result<Option<Arc<dyn Aggregator>>, AppError> {
    let Some(name) = &args.aggregate else {
        return Ok(None);
    };
    let channels = (!args.channels.is_empty()).then(|| args.channels.clone());
    stats::by_name(name, channels).map(Some).ok_or_else(|| {
        AppError::Args(format!(
            "unknown aggregator {name:?} (use mean|median|count|pNN)"
        ))
    })
}

fn resolve_output_dir(base: &Path, run_mode: RunMode) -> PathBuf {
    match run_mode {
        RunMode::Standalone => base.to_path_buf(),
        RunMode::Pipeline => base.join("kira-cytogate"),
    }
}

fn read_git_hash(repo_root: &Path) -> Option<String> {
    let head = repo_root.join(".git/HEAD");
    let content = std::fs::read_to_string(head).ok()?;
    if let Some(ref_line) = content.strip_prefix("ref: ") {
        let ref_path = repo_root.join(".git").join(ref_line.trim());
        return std::fs::read_to_string(ref_path)
            .ok()
            .map(|s| s.trim().to_string());
    }
    Some(content.trim().to_string())
}

#[cfg(test)]
#[path = "../tests/src_inline/main_inline.rs"]
mod tests;
