//! Human and JSON renderings of a [`RunSummary`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::{RunSummary, StageOutcome};

/// One `stage: name=<kind> status=<status> duration_secs=<secs>` line per stage.
pub fn summary_lines(summary: &RunSummary) -> Vec<String> {
    summary.outcomes.iter().map(summary_line).collect()
}

fn summary_line(outcome: &StageOutcome) -> String {
    #[allow(clippy::cast_precision_loss)]
    let secs = outcome.duration_ms as f64 / 1000.0;
    format!(
        "stage: name={} status={} duration_secs={:.2}",
        outcome.stage, outcome.status, secs
    )
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::policy::{FailurePolicy, StageStatus};
    use crate::core::stage::StageKind;

    fn outcome(stage: StageKind, status: StageStatus, duration_ms: u64) -> StageOutcome {
        StageOutcome {
            stage,
            command: vec![stage.to_string()],
            status,
            duration_ms,
            stdout_truncated: 0,
            stderr_truncated: 0,
        }
    }

    #[test]
    fn lines_follow_stage_order() {
        let summary = RunSummary {
            target: "./jsonmore".to_string(),
            policy: FailurePolicy::Abort,
            error: None,
            outcomes: vec![
                outcome(StageKind::Lint, StageStatus::Passed, 1250),
                outcome(StageKind::Format, StageStatus::Failed { code: Some(123) }, 40),
                outcome(StageKind::Test, StageStatus::Skipped, 0),
            ],
        };
        assert_eq!(
            summary_lines(&summary),
            vec![
                "stage: name=lint status=passed duration_secs=1.25",
                "stage: name=format status=failed(exit=123) duration_secs=0.04",
                "stage: name=test status=skipped duration_secs=0.00",
            ]
        );
    }

    #[test]
    fn json_summary_is_written_with_newline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("out/summary.json");
        let summary = RunSummary {
            target: "src".to_string(),
            policy: FailurePolicy::Continue,
            error: None,
            outcomes: vec![outcome(StageKind::Test, StageStatus::TimedOut, 10)],
        };
        write_json(&path, &summary).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(value["target"], "src");
        assert_eq!(value["outcomes"][0]["status"], "timed_out");
    }
}
