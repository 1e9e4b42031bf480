//! BoxTrain - Tesseract training data pipeline
//!
//! Turns annotated document scans into box-file ground truth and drives the
//! external training toolchain to produce a trained model per document.

mod annotation;
mod config;
mod ground_truth;
mod storage;
mod training;
mod vision;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::annotation::{ingest_submission, load_annotations, Submission};
use crate::config::AppConfig;
use crate::ground_truth::{read_ground_truth, validate_ground_truth};
use crate::training::{run_batch, Orchestrator, ProcessToolchain, RunOutcome, TrainingRun};

/// BoxTrain - Tesseract training data pipeline
#[derive(Parser, Debug)]
#[command(name = "boxtrain")]
#[command(about = "Build box-file ground truth from annotations and train Tesseract models")]
struct Args {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store an annotated document and write its ground truth
    Submit {
        /// JSON array of {x1, y1, x2, y2, text} annotations
        #[arg(long)]
        annotations: PathBuf,
        /// Rectified source image the annotations were drawn on
        #[arg(long)]
        image: PathBuf,
        /// File holding the overlay snapshot as a data URL
        #[arg(long)]
        annotated_image: Option<PathBuf>,
        /// Run identifier (defaults to a timestamp)
        #[arg(long)]
        id: Option<String>,
    },
    /// Train one pair, or every pair found in the configured directories
    Train {
        #[arg(long, requires = "ground_truth")]
        image: Option<PathBuf>,
        #[arg(long, requires = "image")]
        ground_truth: Option<PathBuf>,
        /// Run identifier for a single pair (defaults to the image file stem)
        #[arg(long, requires = "image")]
        id: Option<String>,
    },
    /// Check a ground-truth file and list every malformed line
    Check { ground_truth: PathBuf },
    /// Rewrite an image as TIFF at a fixed DPI
    Normalize {
        source: PathBuf,
        destination: PathBuf,
        /// Target resolution (defaults to the configured value)
        #[arg(long)]
        dpi: Option<u32>,
    },
    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.as_deref();
    match args.command {
        Command::Submit {
            annotations,
            image,
            annotated_image,
            id,
        } => {
            let config = load_or_create_config(config_path)?;
            submit(&config, &annotations, image, annotated_image.as_deref(), id)
        }
        Command::Train {
            image,
            ground_truth,
            id,
        } => {
            let config = load_or_create_config(config_path)?;
            train(&config, image.zip(ground_truth), id)
        }
        Command::Check { ground_truth } => check(&ground_truth),
        Command::Normalize {
            source,
            destination,
            dpi,
        } => {
            let dpi = match dpi {
                Some(dpi) => dpi,
                None => load_or_create_config(config_path)?.training.dpi,
            };
            vision::normalize_dpi(&source, &destination, dpi)?;
            info!("Wrote {:?} at {} DPI", destination, dpi);
            Ok(())
        }
        Command::InitConfig { force } => init_config(config_path, force),
    }
}

/// Load configuration from file or create default
///
/// An explicit path must load; the default location falls back to defaults.
fn load_or_create_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        return Ok(config);
    }

    if let Ok(config_path) = storage::default_config_path() {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return Ok(config);
                }
                Err(e) => warn!("Ignoring unreadable configuration: {:#}", e),
            }
        }
    }
    info!("Using default configuration");
    Ok(AppConfig::default())
}

fn init_config(explicit: Option<&Path>, force: bool) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => storage::default_config_path()?,
    };
    if path.exists() && !force {
        bail!("{:?} already exists, pass --force to overwrite", path);
    }
    config::save_config(&AppConfig::default(), &path)?;
    info!("Wrote default configuration to {:?}", path);
    Ok(())
}

fn submit(
    config: &AppConfig,
    annotations: &Path,
    image: PathBuf,
    annotated_image: Option<&Path>,
    run_id: Option<String>,
) -> Result<()> {
    let annotated_image = annotated_image
        .map(|path| {
            std::fs::read_to_string(path)
                .map(|content| content.trim().to_string())
                .with_context(|| format!("Failed to read annotated image {:?}", path))
        })
        .transpose()?;

    let submission = Submission {
        annotations: load_annotations(annotations)?,
        source_image: image,
        annotated_image,
        run_id,
    };
    let output = ingest_submission(&submission, config)?;
    info!("Run {}: {} glyphs", output.run_id, output.glyph_count);
    info!("  origin:   {:?}", output.origin_image);
    info!("  tiff:     {:?}", output.tiff_image);
    info!("  boundary: {:?}", output.boundary_image);
    println!("{}", output.ground_truth.display());
    Ok(())
}

fn train(config: &AppConfig, pair: Option<(PathBuf, PathBuf)>, run_id: Option<String>) -> Result<()> {
    let toolchain = ProcessToolchain::new(config.training.stage_timeout())?;
    toolchain
        .check_installed(&config.toolchain.tesseract)
        .context("Tesseract is not installed or not on PATH")?;

    let orchestrator = Orchestrator::new(&toolchain, config);

    let Some((image, ground_truth)) = pair else {
        let report = run_batch(&orchestrator, config)
            .with_context(|| format!("Failed to scan {:?}", config.directories.tiff))?;
        for run in &report.runs {
            report_run(run);
            if let Some(stage) = run.failed_stage() {
                error!("{} stopped at {}", run.run_id, stage);
            }
        }
        for skipped in &report.skipped {
            warn!("Skipped {:?}: no {:?}", skipped.image, skipped.expected_ground_truth);
        }
        if !report.all_completed() {
            bail!("{} of {} training runs failed", report.failed(), report.runs.len());
        }
        return Ok(());
    };

    let run_id = match run_id {
        Some(id) => id,
        None => image
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(str::to_string)
            .with_context(|| format!("Cannot derive a run id from {:?}", image))?,
    };

    let run = orchestrator.run(&image, &ground_truth, &run_id);
    report_run(&run);
    match run.outcome {
        RunOutcome::Completed { model } => {
            println!("{}", model.display());
            Ok(())
        }
        RunOutcome::ModelMissing { expected } => {
            bail!("Training finished without producing {:?}", expected)
        }
        RunOutcome::Failed { stage, error } => {
            Err(anyhow::Error::new(error).context(format!("Training {} failed at {}", run_id, stage)))
        }
    }
}

/// Log where a run got to, with the output captured at every stage
fn report_run(run: &TrainingRun) {
    info!(
        "{}: {:?} ({:?} + {:?}, normalized to {:?})",
        run.run_id, run.state, run.source_image, run.ground_truth, run.normalized_image
    );
    for result in &run.stage_results {
        let status = if result.success { "ok" } else { "FAILED" };
        debug!("[{}] {} {}", run.run_id, result.stage, status);
        if !result.stdout.trim().is_empty() {
            debug!("[{}] {} stdout:\n{}", run.run_id, result.stage, result.stdout.trim_end());
        }
        if !result.stderr.trim().is_empty() {
            debug!("[{}] {} stderr:\n{}", run.run_id, result.stage, result.stderr.trim_end());
        }
    }
}

fn check(path: &Path) -> Result<()> {
    let report = validate_ground_truth(path).with_context(|| format!("Failed to read {:?}", path))?;

    for line in &report.malformed {
        error!(
            "{:?} line {}: expected {} fields, found {}: {:?}",
            report.path,
            line.line_number,
            ground_truth::FIELD_COUNT,
            line.field_count,
            line.content
        );
    }
    if !report.is_valid() {
        bail!(
            "{:?}: {} of {} lines malformed",
            report.path,
            report.malformed.len(),
            report.lines_checked
        );
    }

    // Field counts are fine; also make sure every field parses
    let records = read_ground_truth(path)?;
    info!("{:?}: {} records OK", path, records.len());
    Ok(())
}
