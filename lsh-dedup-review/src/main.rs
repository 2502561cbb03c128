mod console;
mod preview;
mod review;
mod session;
mod workflow;

use clap::{ArgAction, Parser, Subcommand};
use console::ConsoleReviewer;
use indicatif::ProgressBar;
use lsh_dedup_labeler::config::DedupConfig;
use lsh_dedup_labeler::error::DedupError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use workflow::{TrainingReport, Workspace};

#[derive(Parser)]
#[command(name = "dedup-review")]
#[command(about = "Label uncertain record pairs and cluster a dataset into duplicates")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./dedup.toml when present)
    #[arg(long, short = 'c', env = "DEDUP_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Dataset CSV with a header row
    #[arg(long, short = 'd', env = "DEDUP_DATASET", global = true)]
    dataset: Option<PathBuf>,

    /// Column holding record ids (row numbers are used otherwise)
    #[arg(long, global = true)]
    id_column: Option<String>,

    /// Labelled examples, read to warm-start and overwritten by training
    #[arg(long, global = true)]
    training_file: Option<PathBuf>,

    /// Cluster membership output
    #[arg(long, global = true)]
    output_file: Option<PathBuf>,

    /// Labeling session state, one per dataset
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    /// Seed for blocking and sampling
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show columns, field types and the first rows of the dataset
    Preview {
        /// Rows to show
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },

    /// Review uncertain pairs interactively
    #[command(after_help = "\
Answers:
  y  the records refer to the same thing
  n  they are distinct
  u  unsure (counted as both)
  p  revisit the previous pair
  f  finished")]
    Label {
        /// Train and write clusters once labeling ends
        #[arg(long)]
        train: bool,

        /// Cluster threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Train on the labelled examples and write clusters
    Train {
        /// Cluster threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Apply the clusters to the dataset (not implemented yet)
    Cleanse,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), DedupError> {
    let mut config = DedupConfig::load(cli.config.as_deref())?;
    if let Some(dataset) = cli.dataset {
        config.dataset = Some(dataset);
    }
    if let Some(id_column) = cli.id_column {
        config.id_column = Some(id_column);
    }
    if let Some(training_file) = cli.training_file {
        config.training_file = training_file;
    }
    if let Some(output_file) = cli.output_file {
        config.output_file = output_file;
    }
    if let Some(session_file) = cli.session_file {
        config.session_file = session_file;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    match cli.command {
        Commands::Preview { rows } => {
            let workspace = Workspace::open(config)?;
            let stdout = io::stdout();
            preview::render_preview(&mut stdout.lock(), &workspace.dataset, &workspace.fields, rows)
                .map_err(|err| DedupError::io(&workspace.dataset_path, err))
        }
        Commands::Label { train, threshold } => {
            apply_threshold(&mut config, threshold)?;
            let workspace = Workspace::open(config)?;
            let mut session = workspace.load_session()?;
            let mut matcher = workspace.prepare_matcher(&session)?;
            let stdin = io::stdin();
            let mut reviewer =
                ConsoleReviewer::new(stdin.lock(), io::stdout(), io::stderr().is_terminal());
            workflow::label(&workspace, &mut matcher, &mut session, &mut reviewer)?;
            if train {
                let report = with_spinner("Training model", || {
                    workflow::train(&workspace, &mut matcher, &mut session)
                })?;
                log_report(&report);
            }
            Ok(())
        }
        Commands::Train { threshold } => {
            apply_threshold(&mut config, threshold)?;
            let workspace = Workspace::open(config)?;
            let mut session = workspace.load_session()?;
            let mut matcher = workspace.prepare_matcher(&session)?;
            let report = with_spinner("Training model", || {
                workflow::train(&workspace, &mut matcher, &mut session)
            })?;
            log_report(&report);
            Ok(())
        }
        Commands::Cleanse => {
            warn!("cleanse is not implemented yet");
            Ok(())
        }
    }
}

fn apply_threshold(config: &mut DedupConfig, threshold: Option<f64>) -> Result<(), DedupError> {
    if let Some(threshold) = threshold {
        config.threshold = threshold;
        config.validate()?;
    }
    Ok(())
}

fn with_spinner<T>(message: &'static str, f: impl FnOnce() -> T) -> T {
    let spinner = ProgressBar::new_spinner();
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = f();
    spinner.finish_and_clear();
    result
}

fn log_report(report: &TrainingReport) {
    info!(
        "Trained on {} match / {} distinct examples; {} records in {} clusters",
        report.matches, report.distinct, report.records, report.clusters
    );
}
