//! Toolchain execution
//!
//! [`Toolchain`] is the seam between stage sequencing and process execution:
//! the orchestrator only sees commands going in and captured output coming
//! back, so it can be driven by a stub in tests.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::error::ToolchainError;
use super::stages::StageCommand;

/// Captured result of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

#[cfg(test)]
impl StageOutput {
    pub fn succeeded(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            success: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn failed(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

impl From<std::process::Output> for StageOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs external training commands to completion
pub trait Toolchain {
    /// Run `command` and block until it exits
    ///
    /// A non-zero exit is reported through [`StageOutput::success`], not as an error.
    fn execute(&self, command: &StageCommand) -> Result<StageOutput, ToolchainError>;
}

/// Executes commands as child processes with a per-command timeout
pub struct ProcessToolchain {
    runtime: Runtime,
    timeout: Duration,
}

impl ProcessToolchain {
    pub fn new(timeout: Duration) -> Result<Self, ToolchainError> {
        let runtime = Runtime::new().map_err(ToolchainError::Runtime)?;
        Ok(Self { runtime, timeout })
    }

    /// Run `<tesseract> --version` and return the first line it prints
    pub fn check_installed(&self, tesseract: &Path) -> Result<String, ToolchainError> {
        let output = self.runtime.block_on(async {
            let child = tokio::process::Command::new(tesseract)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| ToolchainError::Spawn {
                    program: tesseract.to_path_buf(),
                    source,
                })?;
            wait_with_timeout(child, tesseract, self.timeout).await
        })?;

        // Older releases print the banner on stderr
        let banner = if output.stdout.trim().is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = banner.lines().next().unwrap_or_default().trim().to_string();
        info!("Tesseract is installed: {}", version);
        Ok(version)
    }
}

impl Toolchain for ProcessToolchain {
    fn execute(&self, command: &StageCommand) -> Result<StageOutput, ToolchainError> {
        debug!("Spawning {:?} in {:?}", command.program, command.working_dir);
        self.runtime.block_on(async {
            let child = tokio::process::Command::new(&command.program)
                .args(&command.args)
                .current_dir(&command.working_dir)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| ToolchainError::Spawn {
                    program: command.program.clone(),
                    source,
                })?;
            wait_with_timeout(child, &command.program, self.timeout).await
        })
    }
}

/// Dropping the child on timeout kills it
async fn wait_with_timeout(
    child: tokio::process::Child,
    program: &Path,
    timeout: Duration,
) -> Result<StageOutput, ToolchainError> {
    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(StageOutput::from(output)),
        Ok(Err(source)) => Err(ToolchainError::Wait {
            program: program.to_path_buf(),
            source,
        }),
        Err(_) => Err(ToolchainError::Timeout {
            program: program.to_path_buf(),
            timeout,
        }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::training::stages::Stage;
    use std::path::PathBuf;

    fn shell(script: &str) -> StageCommand {
        StageCommand {
            stage: Stage::ClassifierTraining,
            program: PathBuf::from("sh"),
            args: vec!["-c".into(), script.into()],
            working_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_captures_output_and_exit_code() {
        let toolchain = ProcessToolchain::new(Duration::from_secs(10)).unwrap();
        let output = toolchain
            .execute(&shell("echo out; echo err >&2; exit 3"))
            .unwrap();

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_success() {
        let toolchain = ProcessToolchain::new(Duration::from_secs(10)).unwrap();
        let output = toolchain.execute(&shell("printf done")).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "done");
    }

    #[test]
    fn test_runs_in_working_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let toolchain = ProcessToolchain::new(Duration::from_secs(10)).unwrap();
        let mut command = shell("touch marker");
        command.working_dir = dir.path().to_path_buf();

        toolchain.execute(&command).unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[test]
    fn test_timeout_is_an_error() {
        let toolchain = ProcessToolchain::new(Duration::from_millis(200)).unwrap();
        let result = toolchain.execute(&shell("sleep 5"));
        assert!(matches!(result, Err(ToolchainError::Timeout { .. })));
    }

    #[test]
    fn test_missing_program_is_a_spawn_error() {
        let toolchain = ProcessToolchain::new(Duration::from_secs(5)).unwrap();
        let command = StageCommand {
            stage: Stage::TrFileGeneration,
            program: PathBuf::from("definitely-not-a-real-training-tool"),
            args: vec![],
            working_dir: std::env::temp_dir(),
        };
        assert!(matches!(
            toolchain.execute(&command),
            Err(ToolchainError::Spawn { .. })
        ));
        assert!(matches!(
            toolchain.check_installed(Path::new("definitely-not-a-real-training-tool")),
            Err(ToolchainError::Spawn { .. })
        ));
    }
}
