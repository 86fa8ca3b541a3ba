//! Orchestration for a full lint → format → test pass.
//!
//! Stages run strictly one after another. Each stage's verdict is recorded;
//! the [`FailurePolicy`] decides whether a non-passing stage ends the
//! sequence (remaining stages are recorded as skipped and never spawned).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::policy::{FailurePolicy, StageStatus, should_run_next};
use crate::core::stage::{StageKind, StageSpec};
use crate::io::config::StagesConfig;
use crate::io::executor::{StageExecutor, StageRequest, StageRun};
use crate::io::stage_log::{stage_log_path, write_stage_log};

/// Inputs shared by every stage of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Target directory, recorded in the summary.
    pub target: String,
    pub workdir: PathBuf,
    pub policy: FailurePolicy,
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
    /// When set, each executed stage writes `<log_dir>/<n>-<stage>.log`.
    pub log_dir: Option<PathBuf>,
    /// Print `==> <command>` to stderr before each stage.
    pub announce: bool,
}

impl PipelineOptions {
    pub fn from_config(cfg: &StagesConfig, workdir: PathBuf) -> Self {
        Self {
            target: cfg.target.clone(),
            workdir,
            policy: cfg.failure_policy,
            timeout: cfg.timeout(),
            output_limit_bytes: cfg.output_limit_bytes,
            log_dir: None,
            announce: false,
        }
    }
}

/// Recorded verdict for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    pub stage: StageKind,
    pub command: Vec<String>,
    #[serde(flatten)]
    pub status: StageStatus,
    pub duration_ms: u64,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
}

/// Outcome of a whole pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub target: String,
    pub policy: FailurePolicy,
    pub outcomes: Vec<StageOutcome>,
    /// Why the pipeline stopped early without a verdict, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    /// True when every planned stage ran and passed.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.outcomes.iter().all(|outcome| outcome.status.is_pass())
    }

    /// First stage that did not pass (skipped stages excluded).
    pub fn first_failure(&self) -> Option<&StageOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| !matches!(outcome.status, StageStatus::Passed | StageStatus::Skipped))
    }

    pub fn outcome(&self, stage: StageKind) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|outcome| outcome.stage == stage)
    }
}

/// Run `plan` in order with `executor`.
///
/// Stage verdicts never produce an `Err`. A stage that cannot be run at all
/// (spawn failure) is recorded as [`StageStatus::Errored`], later stages are
/// skipped, and the error text lands in [`RunSummary::error`] so earlier
/// outcomes are still reported. An unwritable log directory is an `Err`.
pub fn run_pipeline<E: StageExecutor>(
    plan: &[StageSpec],
    executor: &E,
    options: &PipelineOptions,
) -> Result<RunSummary> {
    debug!(stages = plan.len(), policy = ?options.policy, "starting pipeline");
    let mut outcomes = Vec::with_capacity(plan.len());
    let mut halted = false;
    let mut error = None;

    for (index, stage) in plan.iter().enumerate() {
        if halted {
            debug!(stage = %stage.kind, "skipping stage after earlier failure");
            outcomes.push(StageOutcome {
                stage: stage.kind,
                command: stage.command_line(),
                status: StageStatus::Skipped,
                duration_ms: 0,
                stdout_truncated: 0,
                stderr_truncated: 0,
            });
            continue;
        }

        if options.announce {
            eprintln!("==> {}", stage.display());
        }
        info!(stage = %stage.kind, command = %stage.display(), "stage started");

        let request = StageRequest {
            stage: stage.clone(),
            workdir: options.workdir.clone(),
            timeout: options.timeout,
            output_limit_bytes: options.output_limit_bytes,
        };
        let started = Instant::now();
        let run = match executor.run(&request) {
            Ok(run) => run,
            Err(err) => {
                let message = format!("{err:#}");
                error!(stage = %stage.kind, err = %message, "stage could not be run");
                error = Some(message);
                StageRun::bare(StageStatus::Errored)
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if run.status.is_pass() {
            info!(stage = %stage.kind, duration_ms, "stage passed");
        } else {
            info!(stage = %stage.kind, status = %run.status, duration_ms, "stage did not pass");
        }

        if let Some(dir) = &options.log_dir {
            let path = stage_log_path(dir, index + 1, stage);
            write_stage_log(&path, stage, &run)
                .with_context(|| format!("log {} stage", stage.kind))?;
        }

        halted = !should_run_next(options.policy, run.status);
        outcomes.push(StageOutcome {
            stage: stage.kind,
            command: stage.command_line(),
            status: run.status,
            duration_ms,
            stdout_truncated: run.stdout_truncated,
            stderr_truncated: run.stderr_truncated,
        });
    }

    Ok(RunSummary {
        target: options.target.clone(),
        policy: options.policy,
        outcomes,
        error,
    })
}
