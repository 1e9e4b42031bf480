//! Training run errors
//!
//! Every variant is scoped to a single run; the batch driver records it and
//! moves on to the next pair.

use std::path::PathBuf;
use std::time::Duration;

use super::stages::Stage;
use crate::vision::NormalizeError;

/// Failures launching or supervising an external command
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// Executable missing or not runnable
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    /// Command exceeded the per-stage timeout and was killed
    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: PathBuf, timeout: Duration },
    /// Collecting the command's output failed
    #[error("Failed while waiting for {program}: {source}")]
    Wait {
        program: PathBuf,
        source: std::io::Error,
    },
    /// The runtime driving subprocesses could not be created
    #[error("Failed to start process runtime: {0}")]
    Runtime(std::io::Error),
}

/// Why a training run stopped
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    /// Source image unreadable, or the normalized image could not be written
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    /// Ground-truth file could not be read
    #[error("Failed to read ground-truth file {path}: {source}")]
    GroundTruthRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Ground-truth file failed structural validation
    #[error(
        "Invalid ground-truth file {path}: line {line} has {field_count} fields ({malformed_count} malformed lines): {content:?}"
    )]
    GroundTruthFormat {
        path: PathBuf,
        line: usize,
        content: String,
        field_count: usize,
        malformed_count: usize,
    },
    /// External command exited unsuccessfully
    #[error("Stage {stage} failed with {}", describe_exit(.exit_code))]
    ToolchainStage {
        stage: Stage,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// External command could not be run to completion
    #[error("Stage {stage} could not run: {source}")]
    Toolchain { stage: Stage, source: ToolchainError },
    /// A working directory or support file could not be prepared
    #[error("Failed to prepare {path}: {source}")]
    Workspace {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
