//! Executor abstraction for stage invocation.
//!
//! The [`StageExecutor`] trait decouples pipeline orchestration from process
//! spawning. Tests use scripted executors that return predetermined verdicts
//! without touching the filesystem or PATH.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::policy::{StageStatus, classify_exit};
use crate::core::stage::StageSpec;
use crate::io::process::{CommandOutput, Echo, run_stage_command};

/// Parameters for one stage invocation.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub stage: StageSpec,
    /// Working directory for the child process.
    pub workdir: PathBuf,
    /// `None` waits for the child to exit on its own.
    pub timeout: Option<Duration>,
    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

/// Result of running a single stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRun {
    pub status: StageStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

impl StageRun {
    /// A run with no captured output, used by scripted executors.
    pub fn bare(status: StageStatus) -> Self {
        Self {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
        }
    }

    fn from_output(output: CommandOutput) -> Self {
        let status = classify_exit(
            output.status.code(),
            output.status.success(),
            output.timed_out,
        );
        Self {
            status,
            stdout: output.stdout,
            stderr: output.stderr,
            stdout_truncated: output.stdout_truncated,
            stderr_truncated: output.stderr_truncated,
        }
    }
}

/// Abstraction over stage execution backends.
pub trait StageExecutor {
    /// Run one stage to completion and report its verdict.
    ///
    /// A non-zero exit is a verdict, not an error. Errors are reserved for
    /// failures to run the stage at all (e.g. the program is not installed).
    fn run(&self, request: &StageRequest) -> Result<StageRun>;
}

/// Executor that spawns the stage program as a child process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessExecutor {
    pub echo: Echo,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self { echo: Echo::Console }
    }
}

impl StageExecutor for ProcessExecutor {
    #[instrument(skip_all, fields(stage = %request.stage.kind))]
    fn run(&self, request: &StageRequest) -> Result<StageRun> {
        debug!(
            command = %request.stage.display(),
            workdir = %request.workdir.display(),
            "running stage"
        );
        let mut cmd = Command::new(&request.stage.program);
        cmd.args(&request.stage.args).current_dir(&request.workdir);

        let output = run_stage_command(
            cmd,
            request.timeout,
            request.output_limit_bytes,
            self.echo,
        )
        .with_context(|| format!("run {} stage", request.stage.kind))?;
        Ok(StageRun::from_output(output))
    }
}
