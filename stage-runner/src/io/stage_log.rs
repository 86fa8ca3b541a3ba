//! Per-stage log files written under `--log-dir`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::stage::StageSpec;
use crate::io::executor::StageRun;
use crate::io::process::truncated_notice;

/// `<dir>/<position>-<stage>.log`, position starting at 1.
pub fn stage_log_path(dir: &Path, position: usize, stage: &StageSpec) -> PathBuf {
    dir.join(format!("{position}-{}.log", stage.kind))
}

/// Write the command line, verdict, and captured output of one stage.
pub fn write_stage_log(path: &Path, stage: &StageSpec, run: &StageRun) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create stage log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str(&format!("$ {}\n", stage.display()));
    buf.push_str(&format!("status: {}\n", run.status));
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&run.stdout));
    buf.push_str(&truncated_notice(stage.kind.as_str(), "stdout", run.stdout_truncated));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&run.stderr));
    buf.push_str(&truncated_notice(stage.kind.as_str(), "stderr", run.stderr_truncated));

    fs::write(path, buf).with_context(|| format!("write stage log {}", path.display()))?;
    Ok(())
}
