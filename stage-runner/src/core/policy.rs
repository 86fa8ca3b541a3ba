//! Failure propagation between stages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happens to later stages once a stage does not pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// The first stage that does not pass ends the sequence.
    #[default]
    Abort,
    /// Every stage runs regardless of earlier verdicts.
    Continue,
}

/// Verdict recorded for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Passed,
    /// Non-zero exit. `code` is `None` when the child was killed by a signal.
    Failed { code: Option<i32> },
    TimedOut,
    /// Could not be run at all (e.g. the program is not installed).
    Errored,
    /// Never spawned because an earlier stage aborted the sequence.
    Skipped,
}

impl StageStatus {
    pub fn is_pass(self) -> bool {
        matches!(self, StageStatus::Passed)
    }

    pub fn label(self) -> &'static str {
        match self {
            StageStatus::Passed => "passed",
            StageStatus::Failed { .. } => "failed",
            StageStatus::TimedOut => "timed_out",
            StageStatus::Errored => "errored",
            StageStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Failed { code: Some(code) } => write!(f, "failed(exit={code})"),
            StageStatus::Failed { code: None } => f.write_str("failed(signal)"),
            other => f.write_str(other.label()),
        }
    }
}

/// Classify a finished child from its exit code and timeout flag.
pub fn classify_exit(code: Option<i32>, success: bool, timed_out: bool) -> StageStatus {
    if timed_out {
        StageStatus::TimedOut
    } else if success {
        StageStatus::Passed
    } else {
        StageStatus::Failed { code }
    }
}

/// Whether the stage after one with `previous` status should be spawned.
///
/// A stage that could not be run ends the sequence under every policy.
pub fn should_run_next(policy: FailurePolicy, previous: StageStatus) -> bool {
    match (policy, previous) {
        (_, StageStatus::Errored) => false,
        (FailurePolicy::Continue, _) => true,
        (FailurePolicy::Abort, previous) => previous.is_pass(),
    }
}
