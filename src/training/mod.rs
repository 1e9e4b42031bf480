//! Training pipeline
//!
//! Turns (image, ground truth) pairs into trained models by running the
//! external training toolchain one stage at a time.

pub mod batch;
pub mod error;
pub mod orchestrator;
pub mod stages;
pub mod toolchain;

use std::path::PathBuf;

pub use batch::run_batch;
pub use error::TrainingError;
pub use orchestrator::{Orchestrator, TrainingState};
pub use stages::Stage;
pub use toolchain::ProcessToolchain;

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: Stage,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl StageResult {
    fn in_process(stage: Stage) -> Self {
        Self {
            stage,
            success: true,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn from_error(stage: Stage, error: &TrainingError) -> Self {
        match error {
            TrainingError::ToolchainStage { stdout, stderr, .. } => Self {
                stage,
                success: false,
                stdout: stdout.clone(),
                stderr: stderr.clone(),
            },
            other => Self {
                stage,
                success: false,
                stdout: String::new(),
                stderr: other.to_string(),
            },
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Every stage succeeded and the model file exists
    Completed { model: PathBuf },
    /// Every stage succeeded but the toolchain left no model behind
    ModelMissing { expected: PathBuf },
    /// A stage failed and the run stopped there
    Failed { stage: Stage, error: TrainingError },
}

/// Record of one training run
#[derive(Debug)]
pub struct TrainingRun {
    pub run_id: String,
    pub source_image: PathBuf,
    pub ground_truth: PathBuf,
    pub normalized_image: PathBuf,
    /// One entry per attempted stage, in order
    pub stage_results: Vec<StageResult>,
    pub state: TrainingState,
    pub outcome: RunOutcome,
}

impl TrainingRun {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    /// Stage the run stopped at, if it failed
    pub fn failed_stage(&self) -> Option<Stage> {
        match self.outcome {
            RunOutcome::Failed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
