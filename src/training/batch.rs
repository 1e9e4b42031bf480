//! Batch training over a directory of images
//!
//! Pairs every image with the ground-truth file of the same stem and trains
//! each pair independently. A failed pair never stops the batch.

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::orchestrator::Orchestrator;
use super::toolchain::Toolchain;
use super::{RunOutcome, TrainingRun};
use crate::config::AppConfig;

/// An image and its ground truth, keyed by the shared file stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingPair {
    pub run_id: String,
    pub image: PathBuf,
    pub ground_truth: PathBuf,
}

/// Image with no matching ground-truth file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub image: PathBuf,
    pub expected_ground_truth: PathBuf,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub pairs: Vec<TrainingPair>,
    pub skipped: Vec<SkippedImage>,
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Find training pairs, sorted by run id
pub fn discover_pairs(
    image_dir: &Path,
    ground_truth_dir: &Path,
    image_extensions: &[String],
    ground_truth_extension: &str,
) -> std::io::Result<Discovery> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(image_dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, image_extensions) {
            images.push(path);
        }
    }
    images.sort();

    let mut discovery = Discovery::default();
    for image in images {
        let Some(stem) = image.file_stem().and_then(|s| s.to_str()) else {
            warn!("Skipping {:?}: file name is not valid UTF-8", image);
            continue;
        };
        let ground_truth = ground_truth_dir.join(format!("{}.{}", stem, ground_truth_extension));
        if ground_truth.is_file() {
            discovery.pairs.push(TrainingPair {
                run_id: stem.to_string(),
                image,
                ground_truth,
            });
        } else {
            warn!("Ground truth {:?} not found, skipping {:?}", ground_truth, image);
            discovery.skipped.push(SkippedImage {
                image,
                expected_ground_truth: ground_truth,
            });
        }
    }

    Ok(discovery)
}

/// Results of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub runs: Vec<TrainingRun>,
    pub skipped: Vec<SkippedImage>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.runs.iter().filter(|run| run.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.runs.len() - self.completed()
    }

    pub fn all_completed(&self) -> bool {
        self.failed() == 0
    }
}

/// Train every discovered pair under the configured directories
pub fn run_batch<T: Toolchain>(orchestrator: &Orchestrator<'_, T>, config: &AppConfig) -> std::io::Result<BatchReport> {
    let dirs = &config.directories;
    let settings = &config.training;
    let discovery = discover_pairs(
        &dirs.tiff,
        &dirs.boxes,
        &settings.image_extensions,
        &settings.ground_truth_extension,
    )?;
    info!(
        "Found {} training pairs in {:?} ({} without ground truth)",
        discovery.pairs.len(),
        dirs.tiff,
        discovery.skipped.len()
    );

    let mut report = BatchReport {
        runs: Vec::with_capacity(discovery.pairs.len()),
        skipped: discovery.skipped,
    };

    for pair in &discovery.pairs {
        let run = orchestrator.run(&pair.image, &pair.ground_truth, &pair.run_id);
        match &run.outcome {
            RunOutcome::Completed { model } => info!("{}: model at {:?}", run.run_id, model),
            RunOutcome::ModelMissing { expected } => warn!("{}: no model at {:?}", run.run_id, expected),
            RunOutcome::Failed { stage, error } => error!("{}: failed at {}: {}", run.run_id, stage, error),
        }
        report.runs.push(run);
    }

    info!(
        "Batch finished: {} completed, {} failed, {} skipped",
        report.completed(),
        report.failed(),
        report.skipped.len()
    );
    Ok(report)
}
