//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use notefold_core::pipeline::{CancelFlag, PipelineResult, ProgressReporter};
use notefold_core::{Collaborators, run_pipeline, split_file};
use notefold_discovery::{AssetResolver, Resolution};
use notefold_shared::{AppConfig, Report, RunConfig, init_config, load_config};
use notefold_storage::{StateStore, log_summary};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// notefold: fold a tree of markdown notes into summary, raw notes and attachments.
#[derive(Parser)]
#[command(
    name = "notefold",
    version,
    about = "Consolidate a tree of markdown notes into summary, raw-notes and attachments files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Input/output overrides shared by the commands that touch a run.
#[derive(clap::Args, Clone, Debug, Default)]
pub(crate) struct DirArgs {
    /// Root of the markdown note tree.
    #[arg(short, long, env = "NOTEFOLD_INPUT")]
    pub input: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long, env = "NOTEFOLD_OUTPUT")]
    pub output: Option<PathBuf>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full pipeline: consolidate, aggregate, split.
    Run {
        #[command(flatten)]
        dirs: DirArgs,

        /// Concurrent consolidation workers.
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Split an existing corpus file into the three output files.
    Split {
        /// Corpus file (defaults to the configured corpus in the output directory).
        #[arg(long)]
        corpus: Option<PathBuf>,

        #[command(flatten)]
        dirs: DirArgs,
    },

    /// Classify a markdown file (or `-` for stdin).
    Classify {
        /// File to classify.
        path: PathBuf,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show how a reference target resolves from a note.
    Resolve {
        /// Reference target as written in the note.
        target: String,

        /// Note containing the reference.
        #[arg(long)]
        doc: PathBuf,

        /// Input root (defaults to the configured input directory).
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Show the persisted pipeline state.
    Status {
        #[command(flatten)]
        dirs: DirArgs,

        /// Print the full state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "notefold=info",
        1 => "notefold=debug",
        _ => "notefold=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { dirs, workers } => cmd_run(&dirs, workers).await,
        Command::Split { corpus, dirs } => cmd_split(corpus.as_deref(), &dirs),
        Command::Classify { path, json } => cmd_classify(&path, json),
        Command::Resolve { target, doc, root } => cmd_resolve(&target, &doc, root.as_deref()),
        Command::Status { dirs, json } => cmd_status(&dirs, json),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Merge the config file with command-line overrides.
fn run_config(config: &AppConfig, dirs: &DirArgs, workers: Option<usize>) -> RunConfig {
    let mut run = RunConfig::from(config);
    if let Some(input) = &dirs.input {
        run.input_dir = input.clone();
    }
    if let Some(output) = &dirs.output {
        run.output_dir = output.clone();
    }
    if let Some(workers) = workers {
        run.workers = workers;
    }
    run
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(dirs: &DirArgs, workers: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let run = run_config(&config, dirs, workers);
    run.validate()?;

    info!(
        input = %run.input_dir.display(),
        output = %run.output_dir.display(),
        workers = run.workers,
        "consolidating notes"
    );

    let store = StateStore::open(&run.state_path(), run.retry.clone())?;
    let mut opened = store.report;
    let store = store.value;

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current documents");
            on_signal.cancel();
        }
    });

    let collaborators = Collaborators::from_config(&run.collaborators);
    let reporter = CliProgress::new();
    let mut result = run_pipeline(&run, collaborators, &store, &cancel, &reporter).await?;

    opened.merge(result.report);
    result.report = opened;
    print_result(&result);

    if !result.report.errors.is_empty() {
        return Err(eyre!(
            "completed with {} error(s); see the report above",
            result.report.errors.len()
        ));
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!();
    println!("  Run:          {}", result.run_id);
    println!("  Documents:    {}", result.counts.consolidated);
    println!("  Failed:       {}", result.counts.failed);
    println!("  Relations:    {}", result.counts.relationships);
    println!("  New blocks:   {}", result.counts.new_blocks);
    println!(
        "  Deduplicated: {} header(s), {} block(s), {} attachment(s)",
        result.counts.dedup.headers, result.counts.dedup.blocks, result.counts.dedup.attachments
    );
    println!("  Corpus:       {}", result.paths.corpus.display());
    for path in &result.paths.outputs {
        println!("  Output:       {}", path.display());
    }
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    print_report(&result.report);
    println!();
}

fn print_report(report: &Report) {
    if report.is_clean() {
        return;
    }
    println!();
    for issue in &report.errors {
        println!("  error   {issue}");
    }
    for issue in &report.warnings {
        println!("  warning {issue}");
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_done(&self, current: usize, total: usize, path: &str) {
        self.spinner
            .set_message(format!("Consolidated [{current}/{total}] {path}"));
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// split / classify / resolve
// ---------------------------------------------------------------------------

fn cmd_split(corpus: Option<&Path>, dirs: &DirArgs) -> Result<()> {
    let config = load_config()?;
    let run = run_config(&config, dirs, None);
    let corpus = corpus.map(Path::to_path_buf).unwrap_or_else(|| run.corpus_path());

    info!(corpus = %corpus.display(), output = %run.output_dir.display(), "splitting corpus");
    let written = split_file(&corpus, &run.output_dir, &run.retry)?;

    for file in written {
        println!("  {:<12} {}  {}", file.section, &file.sha256[..12], file.path.display());
    }
    Ok(())
}

fn cmd_classify(path: &Path, json: bool) -> Result<()> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?
    };

    let result = notefold_markdown::classify(&text);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{} ({:.2})", result.content_type, result.confidence);
    for score in &result.characteristics.scores {
        println!(
            "  {:<10} weighted {:>6.2}  matches {:>3}",
            score.content_type, score.weighted, score.matches
        );
    }
    Ok(())
}

fn cmd_resolve(target: &str, doc: &Path, root: Option<&Path>) -> Result<()> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => {
            let config = load_config()?;
            if config.defaults.input_dir.is_empty() {
                doc.parent().map(Path::to_path_buf).unwrap_or_default()
            } else {
                PathBuf::from(&config.defaults.input_dir)
            }
        }
    };

    let resolver = AssetResolver::new(std::path::absolute(&root)?);
    match resolver.resolve(target, &std::path::absolute(doc)?) {
        Resolution::Found { path, strategy } => {
            println!("found via {strategy}: {}", path.display());
            Ok(())
        }
        Resolution::NotFound { tried } => {
            println!("not found; tried:");
            for path in &tried {
                println!("  {}", path.display());
            }
            Err(eyre!("'{target}' did not resolve ({} candidates)", tried.len()))
        }
    }
}

// ---------------------------------------------------------------------------
// status / config
// ---------------------------------------------------------------------------

fn cmd_status(dirs: &DirArgs, json: bool) -> Result<()> {
    let config = load_config()?;
    let run = run_config(&config, dirs, None);
    let opened = StateStore::open_readonly(&run.state_path())?;
    let state = opened.value.snapshot()?;
    log_summary(&state);

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!();
    println!("  State:   {}", run.state_path().display());
    println!("  Files:   {}", state.files.len());
    println!("  Blocks:  {}", state.content_hashes.len());
    match &state.last_run {
        Some(last) => {
            println!("  Last run {} at {}", last.run_id, last.finished_at.to_rfc3339());
            println!(
                "           {} document(s), {} failed, {} error(s), {} warning(s), {} new block(s){}",
                last.documents,
                last.failed,
                last.errors,
                last.warnings,
                last.new_blocks,
                if last.cancelled { ", cancelled" } else { "" }
            );
        }
        None => println!("  No runs recorded."),
    }
    for (name, sha) in &state.outputs {
        println!("  {:<20} {}", name, &sha[..sha.len().min(12)]);
    }
    for (path, record) in state.failed_files() {
        println!("  failed  {path} ({} error(s))", record.errors);
    }
    print_report(&opened.report);
    println!();
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "notefold", "-vv", "run", "--input", "notes", "--output", "out", "--workers", "8",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Run { dirs, workers } = cli.command else {
            panic!("expected run");
        };
        let run = run_config(&AppConfig::default(), &dirs, workers);
        assert_eq!(run.input_dir, PathBuf::from("notes"));
        assert_eq!(run.output_dir, PathBuf::from("out"));
        assert_eq!(run.workers, 8);
    }

    #[test]
    fn run_config_keeps_file_defaults_without_overrides() {
        let config = AppConfig::default();
        let run = run_config(&config, &DirArgs::default(), None);
        assert_eq!(run.workers, config.defaults.workers as usize);
        assert_eq!(run.corpus_file, config.defaults.corpus_file);
    }

    #[test]
    fn cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["notefold", "--log-format", "xml", "status"]).is_err());
    }
}
