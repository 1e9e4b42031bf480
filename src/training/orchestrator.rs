//! Training orchestrator
//!
//! Drives one (image, ground truth) pair through the stage sequence:
//!
//! `Start -> DpiCorrected -> GroundTruthValidated -> TrFileGenerated ->
//! UnicharsetExtracted -> FeaturesTrained -> ClassifierTrained ->
//! ModelCombined -> Completed`
//!
//! The first failing stage ends the run in `Failed(stage)`. Nothing is retried
//! and files produced by earlier stages are left in place.

use std::path::Path;
use tracing::{error, info, warn};

use super::error::TrainingError;
use super::stages::{build_command, RunPaths, Stage, CLASSIFIER_OUTPUTS, FONT_PROPERTIES};
use super::toolchain::Toolchain;
use super::{RunOutcome, StageResult, TrainingRun};
use crate::config::AppConfig;
use crate::ground_truth::validate_ground_truth;
use crate::vision::normalize_dpi;

/// Position of a run in the stage sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Start,
    DpiCorrected,
    GroundTruthValidated,
    TrFileGenerated,
    UnicharsetExtracted,
    FeaturesTrained,
    ClassifierTrained,
    ModelCombined,
    Completed,
    Failed(Stage),
}

impl TrainingState {
    /// Stage that moves the run out of this state
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            TrainingState::Start => Some(Stage::DpiCorrection),
            TrainingState::DpiCorrected => Some(Stage::GroundTruthValidation),
            TrainingState::GroundTruthValidated => Some(Stage::TrFileGeneration),
            TrainingState::TrFileGenerated => Some(Stage::UnicharsetExtraction),
            TrainingState::UnicharsetExtracted => Some(Stage::FeatureTraining),
            TrainingState::FeaturesTrained => Some(Stage::ClassifierTraining),
            TrainingState::ClassifierTrained => Some(Stage::ModelCombination),
            TrainingState::ModelCombined | TrainingState::Completed | TrainingState::Failed(_) => None,
        }
    }

    /// State reached when `stage` succeeds
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::DpiCorrection => TrainingState::DpiCorrected,
            Stage::GroundTruthValidation => TrainingState::GroundTruthValidated,
            Stage::TrFileGeneration => TrainingState::TrFileGenerated,
            Stage::UnicharsetExtraction => TrainingState::UnicharsetExtracted,
            Stage::FeatureTraining => TrainingState::FeaturesTrained,
            Stage::ClassifierTraining => TrainingState::ClassifierTrained,
            Stage::ModelCombination => TrainingState::ModelCombined,
        }
    }
}

/// Sequences the training stages for one pair at a time
pub struct Orchestrator<'a, T: Toolchain> {
    toolchain: &'a T,
    config: &'a AppConfig,
}

impl<'a, T: Toolchain> Orchestrator<'a, T> {
    pub fn new(toolchain: &'a T, config: &'a AppConfig) -> Self {
        Self { toolchain, config }
    }

    /// Train one pair end to end
    pub fn run(&self, source_image: &Path, ground_truth: &Path, run_id: &str) -> TrainingRun {
        info!("Training {} with {:?} and {:?}", run_id, source_image, ground_truth);

        let dirs = &self.config.directories;
        let paths = match RunPaths::resolve(run_id, source_image, ground_truth, &dirs.normalized, &dirs.output) {
            Ok(paths) => paths,
            Err(err) => {
                error!("Run {} could not resolve its paths: {}", run_id, err);
                return TrainingRun {
                    run_id: run_id.to_string(),
                    source_image: source_image.to_path_buf(),
                    ground_truth: ground_truth.to_path_buf(),
                    normalized_image: dirs.normalized.join(format!("{}.tiff", run_id)),
                    stage_results: Vec::new(),
                    state: TrainingState::Failed(Stage::DpiCorrection),
                    outcome: RunOutcome::Failed {
                        stage: Stage::DpiCorrection,
                        error: err,
                    },
                };
            }
        };

        let mut state = TrainingState::Start;
        let mut stage_results = Vec::new();
        let mut failure = None;

        while let Some(stage) = state.next_stage() {
            info!("[{}] {} started", run_id, stage);
            match self.execute_stage(stage, &paths) {
                Ok(result) => {
                    info!("[{}] {} succeeded", run_id, stage);
                    stage_results.push(result);
                    state = TrainingState::after(stage);
                }
                Err(err) => {
                    error!("[{}] {} failed: {}", run_id, stage, err);
                    if let TrainingError::ToolchainStage { stdout, stderr, .. } = &err {
                        error!("[{}] STDOUT: {}", run_id, stdout);
                        error!("[{}] STDERR: {}", run_id, stderr);
                    }
                    stage_results.push(StageResult::from_error(stage, &err));
                    state = TrainingState::Failed(stage);
                    failure = Some((stage, err));
                }
            }
        }

        let outcome = match failure {
            Some((stage, error)) => RunOutcome::Failed { stage, error },
            None => {
                let model = paths.model();
                if model.is_file() {
                    state = TrainingState::Completed;
                    info!("[{}] Model saved to {:?}", run_id, model);
                    RunOutcome::Completed { model }
                } else {
                    warn!("[{}] All stages succeeded but {:?} was not produced", run_id, model);
                    RunOutcome::ModelMissing { expected: model }
                }
            }
        };

        TrainingRun {
            run_id: paths.run_id,
            source_image: paths.source_image,
            ground_truth: paths.ground_truth,
            normalized_image: paths.normalized_image,
            stage_results,
            state,
            outcome,
        }
    }

    fn execute_stage(&self, stage: Stage, paths: &RunPaths) -> Result<StageResult, TrainingError> {
        match stage {
            Stage::DpiCorrection => {
                create_dir(&self.config.directories.normalized)?;
                normalize_dpi(&paths.source_image, &paths.normalized_image, self.config.training.dpi)?;
                Ok(StageResult::in_process(stage))
            }
            Stage::GroundTruthValidation => {
                let report = validate_ground_truth(&paths.ground_truth).map_err(|source| {
                    TrainingError::GroundTruthRead {
                        path: paths.ground_truth.clone(),
                        source,
                    }
                })?;
                if let Some(first) = report.first_malformed() {
                    return Err(TrainingError::GroundTruthFormat {
                        path: paths.ground_truth.clone(),
                        line: first.line_number,
                        content: first.content.clone(),
                        field_count: first.field_count,
                        malformed_count: report.malformed.len(),
                    });
                }
                // box.train reads the box file that sits beside its input image
                if paths.staged_ground_truth != paths.ground_truth {
                    std::fs::copy(&paths.ground_truth, &paths.staged_ground_truth).map_err(|source| {
                        TrainingError::Workspace {
                            path: paths.staged_ground_truth.clone(),
                            source,
                        }
                    })?;
                }
                Ok(StageResult::in_process(stage))
            }
            _ => self.execute_external(stage, paths),
        }
    }

    fn execute_external(&self, stage: Stage, paths: &RunPaths) -> Result<StageResult, TrainingError> {
        match stage {
            Stage::TrFileGeneration => create_dir(&paths.output_dir)?,
            Stage::FeatureTraining => ensure_font_properties(paths)?,
            Stage::ModelCombination => prefix_classifier_outputs(paths)?,
            _ => {}
        }

        let Some(command) = build_command(stage, paths, &self.config.toolchain) else {
            return Ok(StageResult::in_process(stage));
        };
        info!("[{}] Executing: {}", paths.run_id, command.command_line());

        let output = self
            .toolchain
            .execute(&command)
            .map_err(|source| TrainingError::Toolchain { stage, source })?;

        if !output.success {
            return Err(TrainingError::ToolchainStage {
                stage,
                exit_code: output.exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(StageResult {
            stage,
            success: true,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn create_dir(path: &Path) -> Result<(), TrainingError> {
    std::fs::create_dir_all(path).map_err(|source| TrainingError::Workspace {
        path: path.to_path_buf(),
        source,
    })
}

/// mftraining needs a font description line for the run id
///
/// The file is shared by every run in the working directory, so a missing
/// entry is appended and existing lines are left untouched.
fn ensure_font_properties(paths: &RunPaths) -> Result<(), TrainingError> {
    let path = paths.output_dir.join(FONT_PROPERTIES);
    let workspace = |source: std::io::Error| TrainingError::Workspace {
        path: path.clone(),
        source,
    };

    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(workspace(err)),
    };
    let listed = existing
        .lines()
        .any(|line| line.split_whitespace().next() == Some(paths.run_id.as_str()));
    if listed {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(&format!("{} 0 0 0 0 0\n", paths.run_id));
    std::fs::write(&path, content).map_err(workspace)
}

/// combine_tessdata only picks up files named `<prefix>.<component>`
fn prefix_classifier_outputs(paths: &RunPaths) -> Result<(), TrainingError> {
    for name in CLASSIFIER_OUTPUTS {
        let source = paths.output_dir.join(name);
        if !source.exists() {
            warn!("[{}] {:?} not found, combine may be incomplete", paths.run_id, source);
            continue;
        }
        let target = paths.prefixed(name);
        std::fs::rename(&source, &target)
            .map_err(|source| TrainingError::Workspace { path: target, source })?;
    }
    Ok(())
}
